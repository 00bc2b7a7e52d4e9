use crate::Args;
use std::path::PathBuf;

/// Runtime settings of the command-line driver
#[derive(Debug, Clone)]
pub struct Settings {
    pub engine: String,
    pub profile: Option<String>,
    pub profile_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub jobs: usize,
    pub trace: bool,
    pub inputs: Vec<PathBuf>,
}

impl From<Args> for Settings {
    fn from(args: Args) -> Self {
        Self {
            engine: args.engine,
            profile: args.profile,
            profile_dir: args.profile_dir,
            output_dir: args.output_dir,
            jobs: args
                .jobs
                .filter(|&n| n > 0)
                .unwrap_or_else(ocr_preprocess::batch::default_jobs),
            trace: args.trace,
            inputs: args.files,
        }
    }
}
