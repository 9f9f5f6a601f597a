pub mod markers {
    pub const READY_FOR_TESTING: &str = "READY_FOR_TESTING";
    pub const TESTING: &str = "TESTING";
    pub const TESTING_COMPLETE: &str = "TESTING_COMPLETE";
    pub const STATE: &str = "STATE";
}

pub mod archive {
    pub const STATUS: &str = "status";
    pub const STDOUT: &str = "stdout";
    pub const STDERR: &str = "stderr";
    pub const EXITCODE: &str = "exitcode";
    pub const TIMED_OUT: &str = "timed_out";
    pub const FIND_MIN_XMX: &str = "find_min_xmx";
}

pub mod logs {
    pub const STDOUT: &str = "stdout.log";
    pub const STDERR: &str = "stderr.log";
}

pub mod timing {
    pub const PULL_DELAY_SECS: u64 = 30;
    pub const RUN_TIMEOUT_SECS: u64 = 3600 * 7;
    pub const TERMINATE_GRACE_SECS: u64 = 10;
}

pub mod exit_codes {
    /// Returned by the tester worker when its sources changed and it wants
    /// the supervisor to start a fresh copy.
    pub const RESTART: i32 = 75;
}

pub mod env {
    pub const LOG_LEVEL: &str = "R8CI_LOG_LEVEL";
    pub const GIT_HASH: &str = "R8CI_GIT_HASH";
    pub const TIMESTAMP: &str = "R8CI_TIMESTAMP";
    pub const ARTIFACT: &str = "R8CI_ARTIFACT";
    pub const OUTPUT_DIR: &str = "R8CI_OUTPUT_DIR";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_constants() {
        assert_eq!(markers::READY_FOR_TESTING, "READY_FOR_TESTING");
        assert_eq!(markers::TESTING, "TESTING");
        assert_eq!(markers::TESTING_COMPLETE, "TESTING_COMPLETE");
    }

    #[test]
    fn test_archive_constants() {
        assert_eq!(archive::STATUS, "status");
        assert_eq!(archive::TIMED_OUT, "timed_out");
    }

    #[test]
    fn test_timing_constants() {
        assert_eq!(timing::PULL_DELAY_SECS, 30);
        assert_eq!(timing::RUN_TIMEOUT_SECS, 25200);
    }
}
