use std::io::{BufRead, Write};
use std::str::FromStr;

use anyhow::{Result, bail};

use crate::media::{CatalogId, MediaKind};

pub(crate) fn prompt_kind<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> Result<MediaKind> {
    prompt_until_valid(input, output, "Type (movie/tv): ", "media type")
}

pub(crate) fn prompt_id<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> Result<CatalogId> {
    prompt_until_valid(input, output, "TMDB ID: ", "TMDB ID")
}

/// Re-asks on invalid input; closed input is an error.
fn prompt_until_valid<T, R, W>(input: &mut R, output: &mut W, label: &str, what: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    R: BufRead,
    W: Write,
{
    loop {
        write!(output, "{label}")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            bail!("no {what} given (input closed)");
        }

        match line.trim().parse::<T>() {
            Ok(value) => return Ok(value),
            Err(err) => writeln!(output, "{err}")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reprompts_until_kind_is_valid() {
        let mut input = Cursor::new("show\n  TV \n");
        let mut output = Vec::new();

        let kind = prompt_kind(&mut input, &mut output).expect("second answer is valid");

        assert_eq!(kind, MediaKind::TvShow);
        let shown = String::from_utf8(output).unwrap();
        assert_eq!(shown.matches("Type (movie/tv): ").count(), 2);
    }

    #[test]
    fn rejects_zero_and_text_ids() {
        let mut input = Cursor::new("abc\n0\n603\n");
        let mut output = Vec::new();

        let id = prompt_id(&mut input, &mut output).expect("third answer is valid");

        assert_eq!(id, CatalogId(603));
        assert_eq!(String::from_utf8(output).unwrap().matches("TMDB ID: ").count(), 3);
    }

    #[test]
    fn closed_input_is_an_error() {
        let mut input = Cursor::new("");
        let err = prompt_id(&mut input, &mut Vec::new()).expect_err("nothing to read");
        assert!(err.to_string().contains("no TMDB ID given"));
    }
}
