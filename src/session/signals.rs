//! Signal dispositions while the engine runs in-process
//!
//! A standalone backend reacts to the coordination signals a server's
//! children use. The host application owns those signals, so they are
//! ignored for the lifetime of a session and the previous dispositions are
//! put back at shutdown.

#[cfg(unix)]
mod imp {
    use std::mem::MaybeUninit;
    use tracing::warn;

    const SIGNALS: [libc::c_int; 7] = [
        libc::SIGHUP,
        libc::SIGINT,
        libc::SIGTERM,
        libc::SIGQUIT,
        libc::SIGPIPE,
        libc::SIGUSR1,
        libc::SIGUSR2,
    ];

    /// Dispositions in effect before `ignore_coordination_signals`.
    pub struct SavedDispositions {
        saved: Vec<(libc::c_int, libc::sigaction)>,
    }

    impl std::fmt::Debug for SavedDispositions {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SavedDispositions")
                .field("signals", &self.saved.iter().map(|(sig, _)| *sig).collect::<Vec<_>>())
                .finish()
        }
    }

    pub fn ignore_coordination_signals() -> SavedDispositions {
        let mut saved = Vec::with_capacity(SIGNALS.len());
        for sig in SIGNALS {
            // SAFETY: a zeroed sigaction with SIG_IGN and an empty mask is a
            // valid disposition; `old` is only read after sigaction succeeds.
            unsafe {
                let mut ignore: libc::sigaction = std::mem::zeroed();
                ignore.sa_sigaction = libc::SIG_IGN;
                libc::sigemptyset(&mut ignore.sa_mask);
                let mut old = MaybeUninit::<libc::sigaction>::uninit();
                if libc::sigaction(sig, &ignore, old.as_mut_ptr()) == 0 {
                    saved.push((sig, old.assume_init()));
                } else {
                    warn!(signal = sig, "could not ignore signal");
                }
            }
        }
        SavedDispositions { saved }
    }

    pub fn restore(dispositions: SavedDispositions) {
        for (sig, old) in dispositions.saved {
            // SAFETY: `old` was filled in by a successful sigaction call.
            if unsafe { libc::sigaction(sig, &old, std::ptr::null_mut()) } != 0 {
                warn!(signal = sig, "could not restore signal disposition");
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    #[derive(Debug)]
    pub struct SavedDispositions;

    pub fn ignore_coordination_signals() -> SavedDispositions {
        SavedDispositions
    }

    pub fn restore(_: SavedDispositions) {}
}

pub(crate) use imp::{ignore_coordination_signals, restore, SavedDispositions};
