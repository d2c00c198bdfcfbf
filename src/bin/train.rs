#![recursion_limit = "256"]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};

use burn::tensor::backend::Backend as BackendTrait;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use tracing::info;

use burn_inflect::logging::init_tracing;
use burn_inflect::{
    CharLanguageModel, CharNgramLm, ExperimentConfig, InflectionCorpus, MorphSeq2Seq, NgramConfig,
    SymbolTable, Trainer, build_model_config, fit, load_experiment_config,
};

type TrainBackend = Autodiff<NdArray<f32>>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train a morphological inflection model")]
struct Cli {
    #[command(flatten)]
    train: TrainArgs,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(ClapArgs, Debug)]
struct TrainArgs {
    /// Additional configuration files applied in order (later files override earlier ones).
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    config: Vec<PathBuf>,
    /// Training corpus (`input|target|label` per line).
    #[arg(long, value_name = "PATH")]
    train: Option<PathBuf>,
    /// Development corpus used for model selection.
    #[arg(long, value_name = "PATH")]
    dev: Option<PathBuf>,
    /// Character table, one symbol per line.
    #[arg(long, value_name = "PATH")]
    vocab: Option<PathBuf>,
    /// Morphology label table, one label per line.
    #[arg(long, value_name = "PATH")]
    morphs: Option<PathBuf>,
    /// Character language model (JSON) to fuse with.
    #[arg(long, value_name = "PATH")]
    lm: Option<PathBuf>,
    /// Directory receiving the best model.
    #[arg(long, value_name = "DIR", default_value = "runs/model")]
    out: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the character and morphology tables from corpora and exit.
    BuildVocab {
        /// Corpora to collect symbols from.
        #[arg(required = true, value_name = "CORPUS")]
        corpora: Vec<PathBuf>,
        #[arg(long, value_name = "PATH", default_value = "vocab.txt")]
        vocab_out: PathBuf,
        #[arg(long, value_name = "PATH", default_value = "morphs.txt")]
        morphs_out: PathBuf,
    },
    /// Fit a character n-gram language model on corpus targets and exit.
    BuildLm {
        #[arg(required = true, value_name = "CORPUS")]
        corpora: Vec<PathBuf>,
        #[arg(long, value_name = "PATH")]
        vocab: PathBuf,
        #[arg(long, value_name = "PATH", default_value = "lm.json")]
        out: PathBuf,
        /// Overrides `[lm] order` from the configuration.
        #[arg(long)]
        order: Option<usize>,
    },
}

pub fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Cli::parse();

    let mut config_paths = vec![PathBuf::from("config/base.toml")];
    config_paths.extend(args.train.config.clone());

    match args.command {
        Some(Command::BuildVocab {
            corpora,
            vocab_out,
            morphs_out,
        }) => build_vocab_only(&corpora, &vocab_out, &morphs_out),
        Some(Command::BuildLm {
            corpora,
            vocab,
            out,
            order,
        }) => {
            let config = load_experiment_config(&config_paths)?;
            let mut lm_config = config.lm;
            if let Some(order) = order {
                lm_config.order = order;
            }
            build_lm_only(&corpora, &vocab, &out, lm_config)
        }
        None => {
            let config = load_experiment_config(&config_paths)?;
            train_model(&config, &args.train)
        }
    }
}

fn read_corpora(paths: &[PathBuf]) -> Result<InflectionCorpus> {
    let mut records = Vec::new();
    for path in paths {
        records.extend(InflectionCorpus::read(path)?.records().iter().cloned());
    }
    Ok(InflectionCorpus::new(records))
}

fn build_vocab_only(
    corpora: &[PathBuf],
    vocab_out: &Path,
    morphs_out: &Path,
) -> Result<()> {
    let corpus = read_corpora(corpora)?;
    let (chars, morphs) = corpus.fit_tables()?;
    chars.write_lines(vocab_out)?;
    morphs.write_lines(morphs_out)?;
    info!(
        "wrote {} characters to {} and {} morphology labels to {}",
        chars.len(),
        vocab_out.display(),
        morphs.len(),
        morphs_out.display()
    );
    Ok(())
}

fn build_lm_only(
    corpora: &[PathBuf],
    vocab: &Path,
    out: &Path,
    config: NgramConfig,
) -> Result<()> {
    let chars = SymbolTable::read_lines(vocab)?;
    let bos = chars.boundaries()?.bos;
    let corpus = read_corpora(corpora)?;
    let targets = corpus
        .records()
        .iter()
        .map(|record| chars.encode(&record.target))
        .collect::<Result<Vec<_>>>()
        .context("corpus target outside the character table")?;

    let lm = CharNgramLm::fit(
        targets.iter().map(Vec::as_slice),
        chars.len(),
        bos,
        config,
    )?;
    lm.save(out)?;
    info!(
        "fitted {}-gram language model on {} sequences",
        lm.order(),
        targets.len()
    );
    Ok(())
}

fn required<'a>(value: &'a Option<PathBuf>, flag: &str) -> Result<&'a PathBuf> {
    match value {
        Some(path) => Ok(path),
        None => bail!("`--{flag}` is required for training"),
    }
}

fn train_model(config: &ExperimentConfig, args: &TrainArgs) -> Result<()> {
    let chars = SymbolTable::read_lines(required(&args.vocab, "vocab")?)?;
    let morphs = SymbolTable::read_lines(required(&args.morphs, "morphs")?)?;
    let symbols = chars.boundaries()?;

    let train = InflectionCorpus::read(required(&args.train, "train")?)?.encode(&chars, &morphs)?;
    let dev = match &args.dev {
        Some(path) => InflectionCorpus::read(path)?.encode(&chars, &morphs)?,
        None => Vec::new(),
    };

    let lm = args.lm.as_ref().map(CharNgramLm::load).transpose()?;
    let lm_ref = lm.as_ref().map(|lm| lm as &dyn CharLanguageModel);

    let model_config = build_model_config(&config.model, chars.len(), morphs.len())?;
    if model_config.variant.lm_fused && lm.is_none() {
        bail!("model variant fuses a language model; pass one with `--lm`");
    }

    let device = <TrainBackend as BackendTrait>::Device::default();
    <TrainBackend as BackendTrait>::seed(&device, config.training.seed);

    info!(
        "model: char_len={}, hidden_len={}, layers={}, vocab={}, morphs={}, variant={:?}",
        model_config.char_len,
        model_config.hidden_len,
        model_config.layers,
        model_config.vocab_len,
        model_config.morph_len,
        model_config.variant
    );
    let model = MorphSeq2Seq::<TrainBackend>::new(model_config, &device)?;
    let mut trainer = Trainer::new(model, &config.optimizer)?;

    let report = fit(
        &mut trainer,
        &train,
        &dev,
        &config.training,
        symbols,
        lm_ref,
        Some(args.out.as_path()),
    )?;

    match report.best_dev_accuracy {
        Some(accuracy) => info!(
            "training complete; best dev accuracy {:.2}%, model in {}",
            accuracy * 100.0,
            args.out.display()
        ),
        None => info!("training complete; model in {}", args.out.display()),
    }
    Ok(())
}
