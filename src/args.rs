use clap::Parser;

/// This is a calibration comparison program for travel-demand model runs.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON configuration describing the survey source and the
    /// model scenarios to compare against it. Paths inside the configuration are
    /// resolved relative to the configuration file.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference file containing a previously generated comparison
    /// summary in JSON format. If provided, modecal will check that the computed
    /// summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the comparison summary will be
    /// written in JSON format to the given location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
