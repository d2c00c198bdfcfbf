#![recursion_limit = "256"]

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use burn::tensor::backend::Backend;
use burn_ndarray::NdArray;
use tracing::{info, warn};

use burn_inflect::logging::init_tracing;
use burn_inflect::{
    CharLanguageModel, CharNgramLm, DecodeStrategy, InflectionCorpus, MorphSeq2Seq, SymbolTable,
    decode_best, load_experiment_config, resolve_decode_strategy,
};

type InferBackend = NdArray<f32>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inflect words with one or an ensemble of trained models")]
struct Args {
    /// Model directories; more than one decodes with their averaged scores.
    #[arg(long = "model", value_name = "DIR", required = true)]
    models: Vec<PathBuf>,
    /// Character table, one symbol per line.
    #[arg(long, value_name = "PATH")]
    vocab: PathBuf,
    /// Morphology label table, one label per line.
    #[arg(long, value_name = "PATH")]
    morphs: PathBuf,
    /// Corpus to inflect (`input|target|label` per line).
    #[arg(long, value_name = "PATH")]
    test: PathBuf,
    /// Character language model (JSON), required by fused models.
    #[arg(long, value_name = "PATH")]
    lm: Option<PathBuf>,
    /// Beam width; overrides the configured decode strategy.
    #[arg(long, value_name = "N")]
    beam: Option<usize>,
    /// Configuration files whose `[decode]` section picks the strategy.
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: Vec<PathBuf>,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let device = <InferBackend as Backend>::Device::default();

    let chars = SymbolTable::read_lines(&args.vocab)?;
    let morphs = SymbolTable::read_lines(&args.morphs)?;
    let symbols = chars.boundaries()?;

    let members = args
        .models
        .iter()
        .map(|dir| MorphSeq2Seq::<InferBackend>::load(dir, &device))
        .collect::<Result<Vec<_>>>()?;
    for (dir, member) in args.models.iter().zip(&members) {
        let config = member.config();
        if config.vocab_len != chars.len() || config.morph_len != morphs.len() {
            bail!(
                "model {} expects {} characters and {} labels, tables hold {} and {}",
                dir.display(),
                config.vocab_len,
                config.morph_len,
                chars.len(),
                morphs.len()
            );
        }
    }
    let member_refs: Vec<&MorphSeq2Seq<InferBackend>> = members.iter().collect();

    let lm = args.lm.as_ref().map(CharNgramLm::load).transpose()?;
    let lm_ref = lm.as_ref().map(|lm| lm as &dyn CharLanguageModel);

    let strategy = match args.beam {
        Some(0) => bail!("`--beam` must be at least 1"),
        Some(width) => DecodeStrategy::Beam { width },
        None if args.config.is_empty() => DecodeStrategy::Greedy,
        None => {
            let config = load_experiment_config(&args.config)?;
            resolve_decode_strategy(&config.decode.strategy)
        }
    };

    let corpus = InflectionCorpus::read(&args.test)?;
    info!(
        "decoding {} records with {} model(s), {strategy:?}",
        corpus.len(),
        members.len()
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut correct = 0usize;
    for (idx, record) in corpus.records().iter().enumerate() {
        let input = chars
            .encode(&record.input)
            .with_context(|| format!("record {}: input outside the character table", idx + 1))?;
        let morph_id = morphs
            .id(&record.label)
            .with_context(|| format!("record {}", idx + 1))? as usize;

        let predicted = decode_best(&member_refs, morph_id, &input, symbols, lm_ref, strategy)?;
        let prediction = chars.decode(&predicted)?;
        if prediction == record.target {
            correct += 1;
        }
        writeln!(out, "{}|{}|{}", record.input, prediction, record.label)?;
    }
    out.flush()?;

    if corpus.is_empty() {
        warn!("test corpus {} is empty", args.test.display());
    } else {
        info!(
            "accuracy: {}/{} = {:.2}%",
            correct,
            corpus.len(),
            100.0 * correct as f32 / corpus.len() as f32
        );
    }
    Ok(())
}
