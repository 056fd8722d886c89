//! Real process-group launcher.

#[cfg(unix)]
pub use unix::ProcessGroupLauncher;

#[cfg(unix)]
mod unix {
    use std::io;
    use std::os::unix::process::CommandExt;
    use std::process::{Child, Command, Stdio};

    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    use tracing::debug;

    use crate::gates::export::JobSpec;
    use crate::traits::{JobLauncher, JobProcess};

    /// Spawns each job as the leader of a fresh process group.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct ProcessGroupLauncher;

    impl JobLauncher for ProcessGroupLauncher {
        fn launch(&self, spec: &JobSpec) -> io::Result<Box<dyn JobProcess>> {
            let child = Command::new(&spec.program)
                .args(&spec.args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .process_group(0)
                .spawn()?;
            debug!(pid = child.id(), program = %spec.program.display(), "Spawned export group");
            Ok(Box::new(GroupChild { child }))
        }
    }

    struct GroupChild {
        child: Child,
    }

    impl GroupChild {
        fn pgid(&self) -> io::Result<Pid> {
            i32::try_from(self.child.id())
                .map(Pid::from_raw)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))
        }

        fn signal(&self, signal: Signal) -> io::Result<()> {
            match killpg(self.pgid()?, signal) {
                // Group already gone.
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(errno) => Err(io::Error::from(errno)),
            }
        }
    }

    impl JobProcess for GroupChild {
        fn id(&self) -> u32 {
            self.child.id()
        }

        fn terminate_group(&mut self) -> io::Result<()> {
            self.signal(Signal::SIGTERM)
        }

        fn kill_group(&mut self) -> io::Result<()> {
            self.signal(Signal::SIGKILL)
        }

        fn try_reap(&mut self) -> io::Result<bool> {
            Ok(self.child.try_wait()?.is_some())
        }

        fn group_alive(&mut self) -> io::Result<bool> {
            // Signal 0 checks the group without delivering anything.
            match killpg(self.pgid()?, None::<Signal>) {
                Ok(()) | Err(Errno::EPERM) => Ok(true),
                Err(Errno::ESRCH) => Ok(false),
                Err(errno) => Err(io::Error::from(errno)),
            }
        }
    }

    impl Drop for GroupChild {
        fn drop(&mut self) {
            match self.child.try_wait() {
                Ok(None) => {
                    let _ = self.signal(Signal::SIGKILL);
                    let _ = self.child.wait();
                }
                Ok(Some(_)) if self.group_alive().unwrap_or(false) => {
                    let _ = self.signal(Signal::SIGKILL);
                }
                _ => {}
            }
        }
    }

}
