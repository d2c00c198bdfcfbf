use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

pub const BOW: &str = "<s>";
pub const EOW: &str = "</s>";

/// IDs of the start-of-word and end-of-word symbols.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundarySymbols {
    pub bos: u32,
    pub eos: u32,
}

/// Bidirectional mapping between symbols (characters or morphology labels)
/// and dense IDs. IDs follow insertion order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolTable {
    id2sym: Vec<String>,
    sym2id: HashMap<String, u32>,
}

impl SymbolTable {
    /// Collects every distinct symbol in order of first appearance. With
    /// `with_boundaries`, `<s>` and `</s>` are inserted first (IDs 0 and 1).
    pub fn fit<'a, I>(symbols: I, with_boundaries: bool) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut set = IndexSet::new();
        if with_boundaries {
            set.insert(BOW.to_string());
            set.insert(EOW.to_string());
        }
        for symbol in symbols {
            if !set.contains(symbol) {
                set.insert(symbol.to_string());
            }
        }
        Self::from_symbols(set.into_iter().collect())
    }

    pub fn from_symbols(symbols: Vec<String>) -> Result<Self> {
        if symbols.is_empty() {
            bail!("symbol table cannot be empty");
        }

        let mut sym2id = HashMap::with_capacity(symbols.len());
        for (idx, symbol) in symbols.iter().enumerate() {
            if symbol.is_empty() || symbol.chars().any(char::is_whitespace) {
                bail!("invalid symbol {symbol:?} at index {idx}");
            }
            if sym2id.insert(symbol.clone(), idx as u32).is_some() {
                bail!("duplicate symbol {symbol:?}");
            }
        }

        Ok(Self {
            id2sym: symbols,
            sym2id,
        })
    }

    /// Reads a plain-text table with one symbol per line; the line order
    /// defines the IDs. Blank lines are skipped.
    pub fn read_lines(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read symbol table {}", path.display()))?;
        let symbols = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self::from_symbols(symbols).with_context(|| format!("invalid symbol table {}", path.display()))
    }

    pub fn write_lines(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let mut text = self.id2sym.join("\n");
        text.push('\n');
        fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&SymbolTableRecord {
            symbols: self.id2sym.clone(),
        })
        .context("failed to serialize symbol table")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read symbol table {}", path.display()))?;
        let record: SymbolTableRecord = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse symbol table {}", path.display()))?;
        Self::from_symbols(record.symbols)
    }

    pub fn id(&self, symbol: &str) -> Result<u32> {
        self.sym2id
            .get(symbol)
            .copied()
            .ok_or_else(|| anyhow!("symbol {symbol:?} missing from table"))
    }

    pub fn symbol(&self, id: u32) -> Option<&str> {
        self.id2sym.get(id as usize).map(String::as_str)
    }

    /// Maps space-separated symbols to IDs.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        text.split_whitespace().map(|symbol| self.id(symbol)).collect()
    }

    /// Joins the symbols of `ids` with single spaces.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        let symbols = ids
            .iter()
            .map(|&id| {
                self.symbol(id)
                    .ok_or_else(|| anyhow!("symbol id {id} out of range"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(symbols.join(" "))
    }

    pub fn boundaries(&self) -> Result<BoundarySymbols> {
        Ok(BoundarySymbols {
            bos: self.id(BOW)?,
            eos: self.id(EOW)?,
        })
    }

    pub fn len(&self) -> usize {
        self.id2sym.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2sym.is_empty()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.sym2id.contains_key(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.id2sym.iter().map(String::as_str)
    }
}

#[derive(Serialize, Deserialize)]
struct SymbolTableRecord {
    symbols: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fit_puts_boundaries_first() {
        let table = SymbolTable::fit(["a", "b", "a", "c"], true).expect("fit");
        assert_eq!(table.len(), 5);
        assert_eq!(table.boundaries().unwrap(), BoundarySymbols { bos: 0, eos: 1 });
        assert_eq!(table.encode("<s> a c </s>").unwrap(), vec![0, 2, 4, 1]);
        assert_eq!(table.decode(&[0, 3, 1]).unwrap(), "<s> b </s>");
    }

    #[test]
    fn unknown_symbols_are_errors() {
        let table = SymbolTable::fit(["a"], true).expect("fit");
        assert!(table.encode("a z").is_err());
        assert!(table.decode(&[9]).is_err());
    }

    #[test]
    fn duplicate_lines_are_rejected() {
        let result = SymbolTable::from_symbols(vec!["a".into(), "b".into(), "a".into()]);
        assert!(result.is_err());
    }

    #[test]
    fn line_and_json_formats_round_trip() {
        let table = SymbolTable::fit(["x", "y"], true).expect("fit");
        let dir = tempdir().expect("tempdir");

        let lines = dir.path().join("vocab.txt");
        table.write_lines(&lines).expect("write lines");
        assert_eq!(SymbolTable::read_lines(&lines).expect("read lines"), table);

        let json = dir.path().join("vocab.json");
        table.save(&json).expect("save");
        assert_eq!(SymbolTable::load(&json).expect("load"), table);
    }
}
