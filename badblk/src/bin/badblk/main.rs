// vim: tw=80
use std::{
    fs::File,
    io,
    path::PathBuf,
    process::exit,
};

use badblk::{BadRange, Badblk, Config, Error, QueryResult};
use clap::{crate_version, Parser, ValueEnum};
use serde_derive::Serialize;
use tracing_subscriber::EnvFilter;

/// Exit status for a query that could not be answered, or any other failure
const EXIT_ERROR: i32 = 2;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{}: {1}", .0.display())]
    Open(PathBuf, io::Error),
    #[error(transparent)]
    Badblk(#[from] Error),
    #[error("cannot format output: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

type Result<T> = std::result::Result<T, CliError>;

#[derive(Parser, Clone, Debug)]
/// Would an I/O to a block device touch unrecoverable bad blocks?
///
/// Exits 0 if the I/O is clear, 1 if it would hit, or 2 if the answer is
/// unknown.
struct Check {
    /// Block device, like /dev/md0 or /dev/mapper/vg0-lv0
    device: PathBuf,
    /// Byte offset of the I/O
    offset: u64,
    /// Length of the I/O in bytes
    len:    u64,
    /// Query on behalf of a write.  Writes start on a page boundary.
    #[clap(short, long)]
    write:  bool,
}

impl Check {
    fn main(self, badblk: &Badblk) -> i32 {
        let file = match File::open(&self.device) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Error: {}", CliError::Open(self.device, e));
                return EXIT_ERROR;
            }
        };
        let r = badblk.query(&file, self.offset, self.len, self.write);
        match r {
            QueryResult::Clear => {
                println!("{r}");
                0
            }
            QueryResult::Hit => {
                println!("{r}");
                1
            }
            QueryResult::Error(e) => {
                eprintln!("Error: {e}");
                EXIT_ERROR
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
enum Format {
    #[default]
    Table,
    Yaml,
}

#[derive(Serialize)]
struct Listing<'a> {
    volume: &'a str,
    ranges: &'a [BadRange],
}

#[derive(Parser, Clone, Debug)]
/// List the unrecoverable sector ranges of a linear volume
struct List {
    #[clap(short, long, value_enum, default_value_t)]
    format: Format,
    /// device-mapper name of the volume, like vg0-lv0
    volume: String,
}

impl List {
    fn main(self, badblk: &Badblk) -> Result<()> {
        let ranges = badblk.get_bad_ranges(&self.volume)?;
        match self.format {
            Format::Table => {
                let mut table = tabular::Table::new("{:>}  {:>}");
                table.add_row(tabular::Row::new()
                    .with_cell("START")
                    .with_cell("LENGTH"));
                for r in ranges.iter() {
                    table.add_row(tabular::Row::new()
                        .with_cell(r.start)
                        .with_cell(r.len));
                }
                print!("{table}");
            }
            Format::Yaml => {
                let listing = Listing {
                    volume: &self.volume,
                    ranges: &ranges
                };
                print!("{}", serde_yaml_ng::to_string(&listing)?);
            }
        }
        Ok(())
    }
}

#[derive(Parser, Clone, Debug)]
/// Describe an md array
struct Geometry {
    /// Array name, like md0
    name: String,
}

impl Geometry {
    fn main(self, badblk: &Badblk) -> Result<()> {
        let geom = badblk.geometry(&self.name)?;
        print!("{}", serde_yaml_ng::to_string(&geom)?);
        Ok(())
    }
}

#[derive(Parser, Clone, Debug)]
enum SubCommand {
    Check(Check),
    Geometry(Geometry),
    List(List),
}

#[derive(Parser, Clone, Debug)]
#[clap(version = crate_version!())]
struct Cli {
    /// YAML configuration file
    #[clap(short, long, global = true)]
    config:     Option<PathBuf>,
    /// Where sysfs is mounted
    #[clap(long, global = true)]
    sysfs:      Option<PathBuf>,
    /// Where procfs is mounted
    #[clap(long, global = true)]
    procfs:     Option<PathBuf>,
    /// The device-mapper control node
    #[clap(long, global = true)]
    dm_control: Option<PathBuf>,
    #[clap(subcommand)]
    cmd:        SubCommand,
}

impl Cli {
    /// Command-line options override the configuration file
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_path(path)?,
            None => Config::default()
        };
        if let Some(p) = &self.sysfs {
            config.sysfs_root = p.clone();
        }
        if let Some(p) = &self.procfs {
            config.procfs_root = p.clone();
        }
        if let Some(p) = &self.dm_control {
            config.dm_control = p.clone();
        }
        Ok(config)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    let cli: Cli = Cli::parse();
    let badblk = match cli.config() {
        Ok(config) => Badblk::new(config),
        Err(e) => {
            eprintln!("Error: {e}");
            exit(EXIT_ERROR);
        }
    };
    let r = match cli.cmd {
        SubCommand::Check(check) => exit(check.main(&badblk)),
        SubCommand::Geometry(geometry) => geometry.main(&badblk),
        SubCommand::List(list) => list.main(&badblk),
    };
    if let Err(e) = r {
        eprintln!("Error: {e}");
        exit(EXIT_ERROR);
    }
}

// LCOV_EXCL_STOP
