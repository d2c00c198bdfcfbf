use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::vocab::SymbolTable;

/// One corpus line: `input symbols|target symbols|morph label`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InflectionRecord {
    pub input: String,
    pub target: String,
    pub label: String,
}

/// A record mapped to symbol and category IDs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedExample {
    pub input: Vec<u32>,
    pub target: Vec<u32>,
    pub morph_id: usize,
}

impl InflectionRecord {
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('|').collect();
        let [input, target, label] = fields.as_slice() else {
            bail!(
                "expected `input|target|label`, found {} field(s) in {line:?}",
                fields.len()
            );
        };
        let normalize = |field: &str| field.split_whitespace().collect::<Vec<_>>().join(" ");
        let record = Self {
            input: normalize(*input),
            target: normalize(*target),
            label: label.trim().to_string(),
        };
        if record.input.is_empty() {
            bail!("empty input in {line:?}");
        }
        if record.label.is_empty() {
            bail!("empty morphology label in {line:?}");
        }
        Ok(record)
    }

    pub fn encode(&self, chars: &SymbolTable, morphs: &SymbolTable) -> Result<EncodedExample> {
        let input = chars
            .encode(&self.input)
            .with_context(|| format!("cannot encode input {:?}", self.input))?;
        let target = chars
            .encode(&self.target)
            .with_context(|| format!("cannot encode target {:?}", self.target))?;
        let morph_id = morphs
            .id(&self.label)
            .with_context(|| format!("unknown morphology label {:?}", self.label))?
            as usize;
        Ok(EncodedExample {
            input,
            target,
            morph_id,
        })
    }
}

/// Line-oriented corpus of inflection records.
#[derive(Clone, Debug, Default)]
pub struct InflectionCorpus {
    records: Vec<InflectionRecord>,
}

impl InflectionCorpus {
    pub fn new(records: Vec<InflectionRecord>) -> Self {
        Self { records }
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read corpus {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid corpus {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let records = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                InflectionRecord::parse(line).with_context(|| format!("line {}", idx + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { records })
    }

    pub fn records(&self) -> &[InflectionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Character table (with `<s>`/`</s>`) and morphology table covering
    /// every record.
    pub fn fit_tables(&self) -> Result<(SymbolTable, SymbolTable)> {
        let chars = SymbolTable::fit(
            self.records.iter().flat_map(|record| {
                record
                    .input
                    .split_whitespace()
                    .chain(record.target.split_whitespace())
            }),
            true,
        )?;
        let morphs = SymbolTable::fit(self.records.iter().map(|r| r.label.as_str()), false)?;
        Ok((chars, morphs))
    }

    pub fn encode(&self, chars: &SymbolTable, morphs: &SymbolTable) -> Result<Vec<EncodedExample>> {
        self.records
            .iter()
            .enumerate()
            .map(|(idx, record)| {
                record
                    .encode(chars, morphs)
                    .with_context(|| format!("record {}", idx + 1))
            })
            .collect()
    }
}

/// Visiting order for one epoch; deterministic for a given seed.
pub fn epoch_order(len: usize, seed: u64, shuffle: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    if shuffle {
        let mut rng = StdRng::seed_from_u64(seed);
        order.shuffle(&mut rng);
    }
    order
}
