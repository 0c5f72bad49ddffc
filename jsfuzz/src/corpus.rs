//! The in-memory corpus and its on-disk layout.
//!
//! A corpus directory holds one `<name>.js` file per testcase. Next to it a
//! `<name>.js.state` file may hold the CBOR-serialized [`TestcaseState`];
//! without one the state is derived from the content.

use anyhow::{Context, bail};
use rand::RngCore;
use rand::seq::IteratorRandom;
use std::fs;
use std::path::{Path, PathBuf};

use crate::database::OperationDatabase;
use crate::state::TestcaseState;
use crate::testcase::Testcase;
use crate::util::read_testcase_file;

const TESTCASE_EXTENSION: &str = "js";
const STATE_EXTENSION: &str = "js.state";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    pub name: String,
    pub testcase: Testcase,
}

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    entries: Vec<CorpusEntry>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `*.js` file of `dir`, in file name order.
    pub fn load_dir(dir: &Path) -> anyhow::Result<Self> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("reading corpus directory {}", dir.display()))?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<_, _>>()
            .with_context(|| format!("listing corpus directory {}", dir.display()))?;
        paths.retain(|path| path.extension().is_some_and(|extension| extension == TESTCASE_EXTENSION));
        paths.sort();

        let mut corpus = Self::new();
        for path in paths {
            let testcase = load_testcase(&path)?;
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            corpus.add(name, testcase);
        }
        Ok(corpus)
    }

    /// Writes `testcase` as `<name>.js` and `<name>.js.state` into `dir`,
    /// creating it if needed. Returns the path of the `.js` file.
    pub fn persist(dir: &Path, name: &str, testcase: &Testcase) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(format!("{name}.{TESTCASE_EXTENSION}"));
        fs::write(&path, &testcase.content).with_context(|| format!("writing {}", path.display()))?;
        let state = testcase
            .state
            .serialize()
            .with_context(|| format!("serializing the state of {name}"))?;
        let state_path = path.with_extension(STATE_EXTENSION);
        fs::write(&state_path, state).with_context(|| format!("writing {}", state_path.display()))?;
        Ok(path)
    }

    pub fn add(&mut self, name: impl Into<String>, testcase: Testcase) -> usize {
        self.entries.push(CorpusEntry {
            name: name.into(),
            testcase,
        });
        self.entries.len() - 1
    }

    pub fn extend(&mut self, other: Corpus) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CorpusEntry> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut CorpusEntry> {
        self.entries.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CorpusEntry> {
        self.entries.iter()
    }

    /// A uniformly drawn entry index.
    pub fn random_index(&self, rng: &mut dyn RngCore) -> Option<usize> {
        (0..self.entries.len()).choose(rng)
    }
}

fn load_testcase(path: &Path) -> anyhow::Result<Testcase> {
    let content = read_testcase_file(path)?;
    let state_path = path.with_extension(STATE_EXTENSION);
    if !state_path.exists() {
        return Ok(Testcase::analyze(content));
    }
    let bytes = fs::read(&state_path).with_context(|| format!("reading {}", state_path.display()))?;
    let state = TestcaseState::deserialize(&bytes)
        .with_context(|| format!("decoding {}", state_path.display()))?;
    let testcase = Testcase::new(content, state);
    if let Err(error) = testcase.validate() {
        bail!("{} does not describe {}: {error}", state_path.display(), path.display());
    }
    Ok(testcase)
}

/// Reads a CBOR-serialized [`OperationDatabase`].
pub fn load_database(path: &Path) -> anyhow::Result<OperationDatabase> {
    let bytes = fs::read(path).with_context(|| format!("reading operation database {}", path.display()))?;
    OperationDatabase::deserialize(&bytes).with_context(|| format!("decoding operation database {}", path.display()))
}

pub fn save_database(path: &Path, database: &OperationDatabase) -> anyhow::Result<()> {
    let bytes = database.serialize().context("serializing the operation database")?;
    fs::write(path, bytes).with_context(|| format!("writing operation database {}", path.display()))
}
