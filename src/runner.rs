use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;

use crate::args::{Args, DemographicModel};
use crate::config::Settings;
use crate::core::{
    CoalescentSimulator, Demography, Introduction, PhyloTree, Reconstruction, Reconstructor,
    SamplingRecord, TransmissionGraph, TransmissionRecord, simplify,
};
use crate::errors::{Result, VirusTreeError};
use crate::readwrite::{NexusWriter, RecordIO, TreeWriter};

pub struct Runner {
    args: Args,
    settings: Settings,
    graph: TransmissionGraph,
}

impl Runner {
    pub fn new(args: Args) -> Result<Runner> {
        Self::setup_logger(&args);
        #[cfg(feature = "parallel")]
        Self::setup_rayon(&args);

        let settings = Self::load_settings(&args)?;

        let transmissions = TransmissionRecord::read(&args.infections)?;
        let samples = SamplingRecord::read(&args.samples)?;
        let graph = TransmissionGraph::from_records(&transmissions, &samples)?;

        Ok(Self {
            args,
            settings,
            graph,
        })
    }

    pub fn start(&self) -> Result<()> {
        let reconstruction = self.run()?;
        self.finish(&reconstruction)
    }

    fn run(&self) -> Result<Reconstruction> {
        let seed = self.settings.seed.unwrap_or_else(|| rand::rng().random());
        log::info!("Using seed {seed}");

        let simulator = CoalescentSimulator::new(
            self.settings.demography,
            self.settings.force_coalescence,
        )
        .with_max_attempts(self.settings.max_attempts);
        let reconstructor = Reconstructor::new(&self.graph, simulator)
            .with_plausibility_threshold(self.settings.plausibility_threshold);

        let bar = match self.args.disable_progress_bar {
            true => None,
            false => {
                let bar = ProgressBar::new(reconstructor.introductions().len() as u64);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template(
                            "[{bar:40}] {pos:>7}/{len:7} [{elapsed_precise} / {duration_precise}] {msg}",
                        )
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=> "),
                );
                Some(bar)
            }
        };

        let reconstruction = reconstructor.reconstruct_all_with(seed, |introduction| {
            if let Some(bar) = &bar {
                bar.set_message(introduction.first_case.clone());
                bar.inc(1);
            }
        })?;

        if let Some(bar) = bar {
            bar.finish_with_message("done");
        }
        Ok(reconstruction)
    }

    fn finish(&self, reconstruction: &Reconstruction) -> Result<()> {
        log::info!(
            "Reconstructed {} trees for {} introductions",
            reconstruction.tree_count(),
            reconstruction.len()
        );
        if self.settings.force_coalescence {
            let improbable = reconstruction
                .improbable(self.settings.plausibility_threshold)
                .count();
            if improbable > 0 {
                log::warn!(
                    "{improbable} introductions have improbable phylogenies under {:?}",
                    self.settings.demography
                );
            }
        }

        let writer = match self.args.annotate_hosts {
            true => NexusWriter::new().with_host_annotations(),
            false => NexusWriter::new(),
        };
        for introduction in reconstruction.iter() {
            self.write_introduction(&writer, introduction)?;
        }
        Ok(())
    }

    fn write_introduction(&self, writer: &NexusWriter, introduction: &Introduction) -> Result<()> {
        if introduction.trees.is_empty() {
            return Ok(());
        }
        let root = &self.args.output_root;
        let first_case = &introduction.first_case;

        let detailed_path = format!("{root}{first_case}_detailed.nex");
        writer.write_to_file(&detailed_path, &introduction.trees)?;

        let simple: Vec<PhyloTree> = introduction.trees.iter().map(simplify).collect();
        let simple_path = format!("{root}{first_case}_simple.nex");
        writer.write_to_file(&simple_path, &simple)?;

        log::info!("Stored trees of {first_case} in {detailed_path} and {simple_path}");
        Ok(())
    }

    /// Setup logging level and file
    fn setup_logger(args: &Args) {
        let log_level = match args.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        simple_logging::log_to_file(args.log_file.as_str(), log_level).unwrap_or_else(|_| {
            eprintln!("Unable to open log file.");
            std::process::exit(1);
        });
    }

    /// Setup rayon thread pool
    #[cfg(feature = "parallel")]
    fn setup_rayon(args: &Args) {
        if let Some(n_threads) = args.threads {
            println!("Setting number of threads to {}.", n_threads);
            rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build_global()
                .unwrap_or_else(|_| {
                    eprintln!("Unable to set number of threads.");
                    std::process::exit(1);
                });
        }
    }

    /// Load settings from file and apply command line overrides
    fn load_settings(args: &Args) -> Result<Settings> {
        let mut settings = match &args.settings {
            Some(path) => Settings::read_from_file(path).map_err(|err| {
                VirusTreeError::ConfigError(format!("Failed to load settings from {path}: {err}"))
            })?,
            None => Settings::default(),
        };

        settings.demography = Self::demography(args, settings.demography);
        settings.force_coalescence |= args.force_coalescence;
        if let Some(max_attempts) = args.max_attempts {
            settings.max_attempts = (max_attempts > 0).then_some(max_attempts);
        }
        if args.seed.is_some() {
            settings.seed = args.seed;
        }

        settings.demography.validate()?;
        log::info!("Loaded settings\n{}", settings);
        Ok(settings)
    }

    /// Demography of `base` with the model and parameters given on the command line.
    fn demography(args: &Args, base: Demography) -> Demography {
        let (model, n0, growth_rate, t50) = match base {
            Demography::Constant { n0 } => (DemographicModel::Constant, n0, 0., 0.),
            Demography::Exponential { n0, growth_rate } => {
                (DemographicModel::Exponential, n0, growth_rate, 0.)
            }
            Demography::Logistic {
                n0,
                growth_rate,
                t50,
            } => (DemographicModel::Logistic, n0, growth_rate, t50),
        };

        let n0 = args.n0.unwrap_or(n0);
        let growth_rate = args.growth_rate.unwrap_or(growth_rate);
        let t50 = args.t50.unwrap_or(t50);
        match args.demographic_model.unwrap_or(model) {
            DemographicModel::Constant => Demography::Constant { n0 },
            DemographicModel::Exponential => Demography::Exponential { n0, growth_rate },
            DemographicModel::Logistic => Demography::Logistic {
                n0,
                growth_rate,
                t50,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, Parser};

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["virustree", "-i", "infections.csv", "-s", "samples.csv"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn command_line_selects_demography() {
        let args = args(&["--demographic-model", "logistic", "--n0", "4", "--growth-rate", "0.5"]);
        assert_eq!(
            Runner::demography(&args, Demography::default()),
            Demography::Logistic {
                n0: 4.,
                growth_rate: 0.5,
                t50: 0.
            }
        );
    }

    #[test]
    fn command_line_keeps_configured_parameters() {
        let args = args(&["--n0", "2"]);
        let base = Demography::Exponential {
            n0: 1.,
            growth_rate: -0.3,
        };
        assert_eq!(
            Runner::demography(&args, base),
            Demography::Exponential {
                n0: 2.,
                growth_rate: -0.3
            }
        );
    }

    #[test]
    fn overrides_apply_to_default_settings() {
        let args = args(&["--force-coalescence", "--max-attempts", "0", "--seed", "7"]);
        let settings = Runner::load_settings(&args).unwrap();
        assert!(settings.force_coalescence);
        assert_eq!(settings.max_attempts, None);
        assert_eq!(settings.seed, Some(7));
        assert_eq!(settings.demography, Demography::default());
    }

    #[test]
    fn invalid_demography_is_rejected() {
        let args = args(&["--n0=-1"]);
        assert!(matches!(
            Runner::load_settings(&args),
            Err(VirusTreeError::InvalidParameter(_))
        ));
    }

    #[test]
    fn missing_settings_file_is_a_config_error() {
        let args = args(&["--settings", "/nonexistent/settings.yaml"]);
        assert!(matches!(
            Runner::load_settings(&args),
            Err(VirusTreeError::ConfigError(_))
        ));
    }

    #[test]
    fn t50_help_refers_to_asymptotic_size() {
        let command = Args::command();
        let help = command
            .get_arguments()
            .find(|arg| arg.get_id() == "t50")
            .and_then(|arg| arg.get_help())
            .map(|help| help.to_string())
            .unwrap();
        assert!(help.contains("half its asymptotic size"), "{help}");
    }
}
