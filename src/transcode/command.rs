use std::ffi::OsString;
use std::path::Path;

use crate::http::USER_AGENT;

const NETWORK_PROTOCOLS: &str = "http,https,tcp,tls,crypto";

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CommandOptions {
    pub(crate) verbose: bool,
    pub(crate) allow_file_protocol: bool,
}

/// Arguments for a stream-copy remux of `stream_url` into a Matroska file.
///
/// All video, audio and subtitle streams are copied without re-encoding.
/// Machine-readable progress goes to stdout.
pub(crate) fn transcode_args(
    stream_url: &str,
    output: &Path,
    options: CommandOptions,
) -> Vec<OsString> {
    let loglevel = if options.verbose { "info" } else { "error" };
    let whitelist = if options.allow_file_protocol {
        format!("file,{NETWORK_PROTOCOLS}")
    } else {
        NETWORK_PROTOCOLS.to_string()
    };

    let mut args: Vec<OsString> = [
        "-hide_banner",
        "-loglevel",
        loglevel,
        "-user_agent",
        USER_AGENT,
        "-protocol_whitelist",
        whitelist.as_str(),
        "-reconnect",
        "1",
        "-reconnect_streamed",
        "1",
        "-reconnect_delay_max",
        "5",
        "-y",
        "-i",
        stream_url,
        "-map",
        "0:v:0",
        "-map",
        "0:a?",
        "-map",
        "0:s?",
        "-c",
        "copy",
        "-f",
        "matroska",
        "-progress",
        "pipe:1",
        "-nostats",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(output.as_os_str().to_os_string());
    args
}
