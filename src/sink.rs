// This module defines the output sink abstraction the emitter and the orchestrator write
// units through. A Sink creates one UnitWriter per unit name; lines are written in execution
// order and a unit is finalized by close. MemorySink keeps closed units in a parking_lot
// guarded map for tests and tooling, and DirSink lays units out as namespaced function files
// under a directory root.

//! Output sinks for emitted units.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writer for a single unit.
pub trait UnitWriter {
    fn write(&mut self, line: &str) -> io::Result<()>;

    /// Finalize the unit. No writes are valid afterwards.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// Destination for emitted units. Shared across compilation threads.
pub trait Sink: Sync {
    fn create(&self, name: &str) -> io::Result<Box<dyn UnitWriter + '_>>;
}

/// In-memory sink; a unit becomes visible when its writer is closed.
#[derive(Debug, Default)]
pub struct MemorySink {
    units: Mutex<BTreeMap<String, Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines of a closed unit.
    pub fn unit(&self, name: &str) -> Option<Vec<String>> {
        self.units.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.lock().contains_key(name)
    }

    /// Names of all closed units, sorted.
    pub fn names(&self) -> Vec<String> {
        self.units.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.units.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.lock().is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Vec<String>> {
        self.units.lock().clone()
    }
}

struct MemoryWriter<'s> {
    sink: &'s MemorySink,
    name: String,
    lines: Vec<String>,
}

impl UnitWriter for MemoryWriter<'_> {
    fn write(&mut self, line: &str) -> io::Result<()> {
        self.lines.push(line.to_string());
        Ok(())
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        let this = *self;
        let previous = this.sink.units.lock().insert(this.name.clone(), this.lines);
        if previous.is_some() {
            log::warn!("unit {} written twice", this.name);
        }
        Ok(())
    }
}

impl Sink for MemorySink {
    fn create(&self, name: &str) -> io::Result<Box<dyn UnitWriter + '_>> {
        Ok(Box::new(MemoryWriter { sink: self, name: name.to_string(), lines: Vec::new() }))
    }
}

/// Writes `<ns>:<path>` to `<root>/data/<ns>/function/<path>.mcfunction`.
#[derive(Debug, Clone)]
pub struct DirSink {
    root: PathBuf,
}

impl DirSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path a unit name maps to.
    pub fn unit_path(&self, name: &str) -> io::Result<PathBuf> {
        let (namespace, path) = name.split_once(':').ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unit name `{name}` has no namespace"),
            )
        })?;
        if path.is_empty() || path.split('/').any(|seg| seg.is_empty() || seg == "..") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unit name `{name}` has an invalid path"),
            ));
        }
        let mut file = self.root.join("data").join(namespace).join("function");
        for segment in path.split('/') {
            file.push(segment);
        }
        file.set_extension("mcfunction");
        Ok(file)
    }
}

struct FileWriter {
    out: BufWriter<File>,
}

impl UnitWriter for FileWriter {
    fn write(&mut self, line: &str) -> io::Result<()> {
        self.out.write_all(line.as_bytes())?;
        self.out.write_all(b"\n")
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        let mut out = self.out;
        out.flush()?;
        out.get_ref().sync_all()
    }
}

impl Sink for DirSink {
    fn create(&self, name: &str) -> io::Result<Box<dyn UnitWriter + '_>> {
        let path = self.unit_path(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        log::trace!("creating {}", path.display());
        Ok(Box::new(FileWriter { out: BufWriter::new(File::create(path)?) }))
    }
}
