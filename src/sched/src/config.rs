use crate::Error;

const MAX_JOBS_VAR: &str = "KILN_MAX_JOBS";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum number of jobs per backend that may be queued or
    /// running at once. Sizes the descriptor pool.
    pub max_jobs: u32,
    /// Name of the thread that runs completion handlers.
    pub runner_thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            max_jobs: 1024,
            runner_thread_name: "kiln-deferred".to_owned(),
        }
    }
}

fn parse_max_jobs(value: &str) -> Result<u32, Error> {
    match value.trim().parse() {
        Ok(0) | Err(_) => Err(Error::Config(
            "KILN_MAX_JOBS must be a positive integer",
        )),
        Ok(n) => Ok(n),
    }
}

impl SchedulerConfig {
    /// The default configuration with overrides taken from the
    /// environment.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(MAX_JOBS_VAR) {
            config.max_jobs = parse_max_jobs(&value)?;
        }
        Ok(config)
    }

    pub fn with_max_jobs(self, max_jobs: u32) -> Self {
        SchedulerConfig { max_jobs, ..self }
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.max_jobs == 0 {
            return Err(Error::Config("max_jobs must be non-zero"));
        }
        Ok(())
    }
}
