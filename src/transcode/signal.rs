use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

#[cfg(unix)]
use anyhow::anyhow;

static SIGINT_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Run-wide cancellation state shared by the supervisor and the batch loop.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelFlag {
    local: Arc<AtomicBool>,
    watch_sigint: bool,
}

impl CancelFlag {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Installs a SIGINT handler and returns a flag that trips when it fires.
    /// The previous handler comes back when the guard is dropped.
    pub(crate) fn install_sigint() -> Result<(Self, SigintGuard)> {
        SIGINT_RECEIVED.store(false, Ordering::SeqCst);
        let guard = SigintGuard::install()?;
        let flag = Self {
            local: Arc::new(AtomicBool::new(false)),
            watch_sigint: true,
        };
        Ok((flag, guard))
    }

    #[cfg(test)]
    pub(crate) fn cancel(&self) {
        self.local.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.local.load(Ordering::SeqCst)
            || (self.watch_sigint && SIGINT_RECEIVED.load(Ordering::SeqCst))
    }
}

#[cfg(unix)]
extern "C" fn on_sigint(_signum: libc::c_int) {
    SIGINT_RECEIVED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
pub(crate) struct SigintGuard {
    old_action: libc::sigaction,
}

#[cfg(unix)]
impl SigintGuard {
    fn install() -> Result<Self> {
        unsafe {
            let mut new_action: libc::sigaction = std::mem::zeroed();
            new_action.sa_sigaction = on_sigint as extern "C" fn(libc::c_int) as usize;
            libc::sigemptyset(&mut new_action.sa_mask);
            new_action.sa_flags = libc::SA_RESTART;

            let mut old_action: libc::sigaction = std::mem::zeroed();
            if libc::sigaction(libc::SIGINT, &new_action, &mut old_action) != 0 {
                return Err(anyhow!("failed to install SIGINT handler"));
            }

            Ok(Self { old_action })
        }
    }
}

#[cfg(unix)]
impl Drop for SigintGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = libc::sigaction(libc::SIGINT, &self.old_action, std::ptr::null_mut());
        }
    }
}

#[cfg(not(unix))]
pub(crate) struct SigintGuard;

#[cfg(not(unix))]
impl SigintGuard {
    fn install() -> Result<Self> {
        Ok(Self)
    }
}
