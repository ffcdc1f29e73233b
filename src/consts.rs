pub mod polling {
    // Overall deadlines. Mock jobs finish in seconds; real ColabFold runs can take most of an hour.
    pub const MOCK_DEADLINE_MS: u64 = 120_000;
    pub const REAL_DEADLINE_MS: u64 = 2_400_000; // 40 minutes

    pub const POLL_INTERVAL_MS: u64 = 5_000;

    /// How long the UI may lag behind an API that already reported success.
    pub const GRACE_WINDOW_MS: u64 = 30_000;

    /// Bounded wait for UI elements to appear (form, job id) outside the main poll loop.
    pub const UI_WAIT_MS: u64 = 15_000;
    pub const UI_WAIT_STEP_MS: u64 = 250;

    pub const REQUEST_TIMEOUT_SECS: u64 = 10;
}

pub mod job {
    /// Identifier prefix assigned by the job store (`job_<date>_<time>_<hex>`).
    pub const JOB_ID_PREFIX: &str = "job_";

    /// Placeholder the UI shows before a job has been created.
    pub const JOB_ID_PLACEHOLDER: &str = "-";

    /// Terminal success text of the UI status field.
    pub const UI_DONE_STATUS: &str = "Done.";
}

pub mod scoring {
    // ranking_confidence = 0.8 * ipTM + 0.2 * pTM
    pub const IPTM_WEIGHT: f64 = 0.8;
    pub const PTM_WEIGHT: f64 = 0.2;
    pub const SCORE_TOLERANCE: f64 = 1e-3;

    pub const PLDDT_MIN: f64 = 0.0;
    pub const PLDDT_MAX: f64 = 100.0;
    pub const PRIMARY_SCORE_MIN: f64 = 0.0;
    pub const PRIMARY_SCORE_MAX: f64 = 1.0;

    /// Minimum number of artifacts a finished job publishes (PDB, scores, MSA).
    pub const MIN_ARTIFACTS: usize = 3;

    /// Primary score rendered by the mock backend.
    pub const MOCK_PRIMARY_SCORE_DISPLAY: &str = "0.3000";
}

pub mod services {
    pub const DEFAULT_FRONTEND_PORT: u16 = 5180;
    pub const DEFAULT_BACKEND_PORT: u16 = 5090;
    pub const DEFAULT_WEBDRIVER_URL: &str = "http://127.0.0.1:9515";

    pub const DEFAULT_PROTEIN_A: &str = "https://www.uniprot.org/uniprotkb/P43220/entry";
    pub const DEFAULT_PROTEIN_B: &str = "https://www.uniprot.org/uniprotkb/P35625/entry";
    pub const DEFAULT_PRESET: &str = "fast";
}
