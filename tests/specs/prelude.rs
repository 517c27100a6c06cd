//! Shared helpers for black-box specs

pub use assert_cmd::Command;

/// Command for the `lh` binary with logging quietened
pub fn lh() -> Command {
    let mut cmd = Command::cargo_bin("lh").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd
}

/// Assertions on a finished command
pub struct Run {
    output: std::process::Output,
}

impl Run {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    pub fn stdout_has(self, expected: &str) -> Self {
        let stdout = self.stdout();
        assert!(
            stdout.contains(expected),
            "stdout missing {expected:?}\n--- stdout ---\n{stdout}"
        );
        self
    }

    pub fn stderr_has(self, expected: &str) -> Self {
        let stderr = self.stderr();
        assert!(
            stderr.contains(expected),
            "stderr missing {expected:?}\n--- stderr ---\n{stderr}"
        );
        self
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.output.stdout).unwrap()
    }
}

pub trait CommandExt {
    /// Run and require exit status 0
    fn passes(&mut self) -> Run;
    /// Run and require a non-zero exit status
    fn fails(&mut self) -> Run;
}

impl CommandExt for Command {
    fn passes(&mut self) -> Run {
        let output = self.output().unwrap();
        assert!(
            output.status.success(),
            "expected success, got {:?}\n--- stderr ---\n{}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
        Run { output }
    }

    fn fails(&mut self) -> Run {
        let output = self.output().unwrap();
        assert!(
            !output.status.success(),
            "expected failure\n--- stdout ---\n{}",
            String::from_utf8_lossy(&output.stdout)
        );
        Run { output }
    }
}
