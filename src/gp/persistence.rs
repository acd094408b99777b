//! Persistence for evolved individuals.
//!
//! Individuals are stored as pretty-printed JSON documents (see
//! [`crate::gp::document`]). Loading resolves primitive names against the
//! caller's primitive sets, so a file only makes sense together with the
//! problem that produced it.

use crate::gp::document::{DocumentError, IndividualDocument};
use crate::gp::individual::Individual;
use crate::gp::primitive_set::PrimitiveSuperSet;
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

/// Error loading an individual from disk.
#[derive(Debug)]
pub enum LoadError {
    /// The file could not be read or parsed as a document.
    Io(io::Error),
    /// The document does not describe a valid individual for these sets.
    Document(DocumentError),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Document(e) => write!(f, "document error: {e}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Document(e) => Some(e),
        }
    }
}

impl From<io::Error> for LoadError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<DocumentError> for LoadError {
    fn from(e: DocumentError) -> Self {
        Self::Document(e)
    }
}

/// Write a document as JSON.
///
/// # Errors
///
/// Returns an error if serialization or file I/O fails.
pub fn save_document(document: &IndividualDocument, path: &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, document)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Read a JSON document.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid document.
pub fn load_document(path: &Path) -> io::Result<IndividualDocument> {
    let reader = BufReader::new(fs::File::open(path)?);
    serde_json::from_reader(reader).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Save an individual.
///
/// # Errors
///
/// Returns an error if a tree is empty, or if serialization or file I/O fails.
pub fn save_individual(individual: &Individual, path: &Path) -> io::Result<()> {
    let document = IndividualDocument::encode(individual)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    save_document(&document, path)
}

/// Load an individual, resolving its primitives through `sets`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not decode against `sets`.
pub fn load_individual(path: &Path, sets: &PrimitiveSuperSet) -> Result<Individual, LoadError> {
    let document = load_document(path)?;
    Ok(document.decode(sets)?)
}
