use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::process::{Child, ChildStdin, Command as Process, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::Context;

use crate::config::PlayerConfig;
use crate::presentation::Command;

/// The player process: receives commands as lines on its stdin.
///
/// Without a child, commands are logged and dropped.
pub struct PlayerBackend {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    program: String,
}

impl PlayerBackend {
    pub fn none() -> Self {
        Self {
            child: None,
            stdin: None,
            program: String::new(),
        }
    }

    /// Launch the player. `{buffer}` and `{addr}` in its arguments are substituted.
    pub fn spawn(player: &PlayerConfig, buffer: &Path, addr: SocketAddr) -> anyhow::Result<Self> {
        let args: Vec<String> = player
            .args
            .iter()
            .map(|arg| substitute(arg, buffer, addr))
            .collect();

        let mut child = Process::new(&player.program)
            .args(&args)
            .env("MPSHELL_ADDR", addr.to_string())
            .env("MPSHELL_BUFFER", buffer)
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("launching player '{}'", player.program))?;
        log::info!(
            "Player started: {} {} (pid {})",
            player.program,
            args.join(" "),
            child.id()
        );

        Ok(Self {
            stdin: child.stdin.take(),
            child: Some(child),
            program: player.program.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    pub fn send(&mut self, command: &Command) {
        let Some(stdin) = self.stdin.as_mut() else {
            log::debug!("No player attached, ignoring '{command}'");
            return;
        };
        let written = writeln!(stdin, "{command}").and_then(|()| stdin.flush());
        match written {
            Ok(()) => log::debug!("-> {}: {command}", self.program),
            Err(e) => {
                log::warn!("Player stdin closed ({e}); dropping '{command}'");
                self.stdin = None;
            }
        }
    }

    /// Reap the child if it has exited.
    pub fn poll_exit(&mut self) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                log::info!("Player exited: {status}");
                self.child = None;
                self.stdin = None;
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("Could not poll player: {e}");
                None
            }
        }
    }

    /// Ask the player to quit, then kill it if it has not exited within `grace`.
    pub fn shutdown(&mut self, grace: Duration) {
        if self.child.is_none() {
            return;
        }
        self.send(&Command::quit());
        // EOF on stdin for players that do not read commands
        self.stdin = None;

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.poll_exit().is_some() {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        if let Some(mut child) = self.child.take() {
            log::warn!("Player did not quit within {grace:?}, killing it");
            if let Err(e) = child.kill() {
                log::warn!("Failed to kill player: {e}");
            }
            let _ = child.wait();
        }
    }
}

impl Drop for PlayerBackend {
    fn drop(&mut self) {
        self.shutdown(Duration::from_millis(500));
    }
}

fn substitute(arg: &str, buffer: &Path, addr: SocketAddr) -> String {
    arg.replace("{buffer}", &buffer.to_string_lossy())
        .replace("{addr}", &addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:47600".parse().unwrap()
    }

    #[test]
    fn placeholders_are_substituted() {
        let buffer = Path::new("/dev/shm/mpshell");
        assert_eq!(
            substitute("-vo=shm:{buffer}@{addr}", buffer, addr()),
            "-vo=shm:/dev/shm/mpshell@127.0.0.1:47600"
        );
        assert_eq!(substitute("movie.mkv", buffer, addr()), "movie.mkv");
    }

    #[test]
    fn detached_backend_ignores_commands() {
        let mut backend = PlayerBackend::none();
        backend.send(&Command::new("pause"));
        assert!(backend.poll_exit().is_none());
        assert!(!backend.is_running());
        backend.shutdown(Duration::from_millis(10));
    }

    #[test]
    fn missing_program_is_an_error() {
        let player = PlayerConfig {
            program: "/nonexistent/mpshell-player".into(),
            args: vec![],
        };
        assert!(PlayerBackend::spawn(&player, Path::new("/tmp/x"), addr()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn commands_reach_player_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("commands.txt");
        let player = PlayerConfig {
            program: "sh".into(),
            args: vec!["-c".into(), format!("cat > '{}'", out.display())],
        };
        let mut backend = PlayerBackend::spawn(&player, dir.path(), addr()).unwrap();
        backend.send(&Command::new("pause"));
        backend.send(&Command::new("seek 10"));
        backend.shutdown(Duration::from_secs(5));

        assert!(!backend.is_running());
        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written, "pause\nseek 10\nquit\n");
    }

    #[cfg(unix)]
    #[test]
    fn exit_is_reported_once() {
        let player = PlayerConfig {
            program: "true".into(),
            args: vec![],
        };
        let mut backend = PlayerBackend::spawn(&player, Path::new("/tmp/x"), addr()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let status = loop {
            if let Some(status) = backend.poll_exit() {
                break status;
            }
            assert!(Instant::now() < deadline, "player never exited");
            std::thread::sleep(Duration::from_millis(10));
        };
        assert!(status.success());
        assert!(backend.poll_exit().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn stubborn_player_is_killed() {
        let player = PlayerConfig {
            program: "sleep".into(),
            args: vec!["30".into()],
        };
        let mut backend = PlayerBackend::spawn(&player, Path::new("/tmp/x"), addr()).unwrap();
        let started = Instant::now();
        backend.shutdown(Duration::from_millis(100));
        assert!(!backend.is_running());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
