use anyhow::Context as _;
use clap::Args;
use dam_solver::io::RawDataset;
use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write, stdin, stdout},
    path::PathBuf,
    str::FromStr,
};

// Every subcommand reads a dataset and writes one artifact.
// This struct standardizes their implementation.
#[derive(Args)]
pub struct IOArgs {
    /// The market data JSON file ("-" implies stdin)
    #[arg(value_parser = clap::value_parser!(PathOrStd))]
    input: PathOrStd,

    /// The output file ("-" implies stdout)
    #[arg(short, long, default_value = "-", value_parser = clap::value_parser!(PathOrStd))]
    output: PathOrStd,
}

impl IOArgs {
    pub fn read(&self) -> anyhow::Result<Box<dyn Read>> {
        match &self.input {
            PathOrStd::Path(path) => {
                let file = File::open(path)
                    .with_context(|| format!("opening {}", path.display()))?;
                Ok(Box::new(BufReader::new(file)))
            }
            PathOrStd::Std => Ok(Box::new(stdin().lock())),
        }
    }

    pub fn write(&self) -> anyhow::Result<Box<dyn Write>> {
        match &self.output {
            PathOrStd::Path(path) => {
                let file = File::create(path)
                    .with_context(|| format!("creating {}", path.display()))?;
                Ok(Box::new(BufWriter::new(file)))
            }
            PathOrStd::Std => Ok(Box::new(stdout().lock())),
        }
    }

    /// Read and parse the dataset
    pub fn dataset(&self) -> anyhow::Result<RawDataset> {
        Ok(RawDataset::from_reader(self.read()?)?)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum PathOrStd {
    Path(PathBuf),
    Std,
}

impl FromStr for PathOrStd {
    type Err = <PathBuf as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "-" {
            Ok(Self::Std)
        } else {
            Ok(Self::Path(s.parse()?))
        }
    }
}
