mod compare;
mod trace;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use lea_ftl::{DftlFtl, DirectFtl, FtlMap, IoKind, LearnedFtl};

#[derive(Debug, Parser)]
#[clap(name = "ftl-replay")]
#[clap(about = "Replays an IO trace against an FTL mapping engine and validates the result.", long_about = None)]
struct Cli {
    /// Trace file to replay
    #[clap(short = 'i', long = "input", required = true, value_parser)]
    input: String,

    /// Reference file for line-by-line validation of the read outputs
    #[clap(short = 'v', long = "validate", required = true, value_parser)]
    validate: String,

    /// Where to write one decimal PPN per read
    #[clap(short = 'o', long = "output", value_parser)]
    output: Option<String>,

    /// Mapping-table representation to replay against
    #[clap(short = 'a', long = "algorithm", value_enum, default_value_t = Algorithm::Learned)]
    algorithm: Algorithm,
}

#[derive(Debug, Clone, Copy, PartialEq, clap::ValueEnum)]
enum Algorithm {
    /// learned multi-level segments + CRB + bitmap dispatch
    Learned,
    /// plain per-group mapping pages
    Direct,
    /// demand-paged mapping pages behind a small LRU
    Dftl,
}

// clap needs Display for default_value_t; the names must match the ValueEnum forms
impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algorithm::Learned => write!(f, "learned"),
            Algorithm::Direct => write!(f, "direct"),
            Algorithm::Dftl => write!(f, "dftl"),
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let parsed = trace::TraceFile::open(&cli.input)
        .with_context(|| format!("could not load trace '{}'", cli.input))?;
    println!("replaying {} IOs from {} ({} engine)", parsed.records.len(), cli.input, cli.algorithm);

    let mut engine: Box<dyn FtlMap> = match cli.algorithm {
        Algorithm::Learned => Box::new(LearnedFtl::new()),
        Algorithm::Direct => Box::new(DirectFtl::new()),
        Algorithm::Dftl => Box::new(DftlFtl::new()),
    };

    let mut outputs: Vec<u64> = Vec::new();
    let started = Instant::now();
    for (index, io) in parsed.records.iter().enumerate() {
        match io.kind {
            IoKind::Read => outputs.push(engine.read(io.lba)),
            IoKind::Write => {
                if let Err(e) = engine.write(io.lba) {
                    // non-fatal by contract: the write is lost, the replay goes on
                    log::error!("write of lba {} failed at record {}: {}", io.lba, index, e);
                }
            }
        }
    }
    engine.flush();
    let elapsed = started.elapsed();

    let stats = engine.stats();
    let millis = elapsed.as_secs_f64() * 1000.0;
    println!(
        "replayed {} IOs ({} reads) in {:.3} ms, {:.1} IOs/ms",
        parsed.records.len(),
        outputs.len(),
        millis,
        parsed.records.len() as f64 / millis.max(f64::MIN_POSITIVE),
    );
    println!("peak mapping memory: {:.3} MiB", stats.mem_max as f64 / (1024.0 * 1024.0));
    log::info!("engine counters: {:?}", stats);

    if let Some(path) = cli.output.as_ref() {
        let mut writer = BufWriter::new(
            File::create(path).with_context(|| format!("could not create output '{}'", path))?,
        );
        for ppn in outputs.iter() {
            writeln!(writer, "{}", ppn)?;
        }
        writer.flush()?;
        println!("wrote {} read results to {}", outputs.len(), path);
    }

    let reference = File::open(&cli.validate)
        .with_context(|| format!("could not open validation file '{}'", cli.validate))?;
    let cmp = compare::against_reference(&outputs, std::io::BufReader::new(reference))?;
    println!(
        "comparison: {} lines, {} matching, accuracy {:.2}%",
        cmp.total,
        cmp.matching,
        cmp.accuracy()
    );
    for (line, expected, produced) in cmp.mismatches.iter() {
        println!("mismatch at line {}: {} != {}", line, expected, produced);
    }
    if let Some((reference_lines, produced_lines)) = cmp.length_skew {
        println!(
            "reference has {} lines but the replay produced {}",
            reference_lines, produced_lines
        );
    }
    if !cmp.passed() {
        bail!("validation against '{}' failed", cli.validate);
    }

    Ok(())
}
