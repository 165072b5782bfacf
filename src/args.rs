use clap::{Parser, ValueEnum};

/// Shape of the within-host effective population size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DemographicModel {
    Constant,
    Exponential,
    Logistic,
}

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about,
    long_about = None,
    name = "virustree",
)]
pub struct Args {
    /// Path to transmission records (csv with IDREC, IDTR, TIME_TR).
    #[clap(long, short)]
    pub infections: String,

    /// Path to sampling records (csv with IDPOP, TIME_SEQ, SEQ_COUNT).
    #[clap(long, short)]
    pub samples: String,

    /// Prefix of the output files.
    #[clap(long, short, default_value = "./")]
    pub output_root: String,

    /// Path to settings.
    #[clap(long)]
    pub settings: Option<String>,

    /// Demographic model within hosts.
    #[clap(long, value_enum)]
    pub demographic_model: Option<DemographicModel>,

    /// Effective population size at the latest event of a host.
    #[clap(long)]
    pub n0: Option<f64>,

    /// Growth rate of exponential and logistic models.
    #[clap(long)]
    pub growth_rate: Option<f64>,

    /// Time of the logistic model at which the population is half its asymptotic size n0.
    #[clap(long)]
    pub t50: Option<f64>,

    /// Redraw treelets until all lineages of a host coalesce.
    #[clap(long)]
    pub force_coalescence: bool,

    /// Maximum number of attempts of a forced coalescence (0 for unbounded).
    #[clap(long)]
    pub max_attempts: Option<usize>,

    /// Seed of the random number generator.
    #[clap(long)]
    pub seed: Option<u64>,

    /// Annotate tree nodes with their hosts.
    #[clap(long)]
    pub annotate_hosts: bool,

    /// Path to log file.
    #[clap(long, default_value = "virustree.log")]
    pub log_file: String,

    /// Increase logging verbosity.
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable progress bar.
    #[clap(long)]
    pub disable_progress_bar: bool,

    /// Number of threads used to reconstruct introductions.
    #[clap(long)]
    pub threads: Option<usize>,
}
