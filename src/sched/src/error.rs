use derive_more::Display;

use crate::{JobInfo, ResourceId};

#[derive(Debug, Display)]
pub enum Error {
    #[display(fmt = "invalid configuration: {}", _0)]
    Config(&'static str),
    /// The completion handler thread could not be started.
    #[display(fmt = "failed to start task runner: {}", _0)]
    Runner(std::io::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Runner(e) => Some(e),
            Error::Config(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Runner(err)
    }
}

/// A job that could not be scheduled. Hands the job back.
#[derive(Debug, Display)]
pub enum ScheduleError<R: ResourceId> {
    /// The backend already has `max_jobs` jobs outstanding.
    #[display(fmt = "backend is at capacity")]
    Full(JobInfo<R>),
}

impl<R: ResourceId> std::error::Error for ScheduleError<R> {}

impl<R: ResourceId> ScheduleError<R> {
    pub fn into_job(self) -> JobInfo<R> {
        match self {
            ScheduleError::Full(job) => job,
        }
    }
}
