//! Layer persistence.
//!
//! A saved layer is one line of JSON: an ordered list of records, each either
//! a type signature or a named field. Every layer type writes its own
//! signature and then delegates to the type it builds on, so loading a
//! `FullyConnected` checks `ffnn::FullyConnected`, then `ffnn::Hidden`, then
//! `ffnn::Layer`, in the same order they were written. A mismatch at any step
//! aborts the load with [`Error::SignatureMismatch`].
//!
//! Because each layer occupies exactly one line, several layers may be saved
//! to and loaded from the same stream in sequence.

use crate::error::{Error, Result};
use crate::layers::Layer;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::io::{BufRead, Write};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Record {
    Signature(String),
    Field { name: String, value: Value },
}

/// Archive being written by [`Layer::save`].
#[derive(Debug, Default)]
pub struct OutputArchive {
    records: Vec<Record>,
}

impl OutputArchive {
    pub fn new() -> Self {
        OutputArchive::default()
    }

    /// Appends a type signature.
    pub fn sign(&mut self, signature: &str) {
        self.records.push(Record::Signature(signature.to_owned()));
    }

    /// Appends a named field.
    pub fn write<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<()> {
        self.records.push(Record::Field {
            name: name.to_owned(),
            value: serde_json::to_value(value)?,
        });
        Ok(())
    }

    /// Writes the archive as a single JSON line.
    pub fn finish<W: Write>(&self, writer: &mut W) -> Result<()> {
        serde_json::to_writer(&mut *writer, &self.records)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Archive being consumed by [`Layer::load`].
#[derive(Debug)]
pub struct InputArchive {
    records: VecDeque<Record>,
}

impl InputArchive {
    /// Reads the next archive line from `reader`.
    pub fn read_from<R: BufRead>(reader: &mut R) -> Result<Self> {
        InputArchive::try_read_from(reader)?.ok_or(Error::TruncatedArchive("archive"))
    }

    /// Like [`InputArchive::read_from`], returning `None` at end of stream.
    pub fn try_read_from<R: BufRead>(reader: &mut R) -> Result<Option<Self>> {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let records: Vec<Record> = serde_json::from_str(line.trim_end())?;
        Ok(Some(InputArchive {
            records: records.into(),
        }))
    }

    /// The next record if it is a signature, without consuming it.
    pub fn peek_signature(&self) -> Option<&str> {
        match self.records.front() {
            Some(Record::Signature(signature)) => Some(signature),
            _ => None,
        }
    }

    /// Consumes the next record, which must be the signature `expected`.
    pub fn check(&mut self, expected: &'static str) -> Result<()> {
        match self.records.pop_front() {
            Some(Record::Signature(found)) if found == expected => Ok(()),
            Some(Record::Signature(found)) => Err(Error::SignatureMismatch {
                expected: expected.to_owned(),
                found,
            }),
            Some(Record::Field { name, .. }) => Err(Error::SignatureMismatch {
                expected: expected.to_owned(),
                found: format!("field `{}`", name),
            }),
            None => Err(Error::TruncatedArchive(expected)),
        }
    }

    /// Consumes the next record, which must be the field `name`.
    pub fn read<T: DeserializeOwned>(&mut self, name: &'static str) -> Result<T> {
        match self.records.pop_front() {
            Some(Record::Field { name: found, value }) if found == name => {
                Ok(serde_json::from_value(value)?)
            }
            Some(Record::Field { name: found, .. }) => Err(Error::SignatureMismatch {
                expected: format!("field `{}`", name),
                found: format!("field `{}`", found),
            }),
            Some(Record::Signature(found)) => Err(Error::SignatureMismatch {
                expected: format!("field `{}`", name),
                found,
            }),
            None => Err(Error::TruncatedArchive(name)),
        }
    }

    /// `true` once every record has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.records.is_empty()
    }
}

/// Saves `layer` as one line of `writer`.
///
/// # Examples
///
/// ```
/// use ffnn::io;
/// use ffnn::layers::{FullyConnected, Layer};
///
/// let layer = FullyConnected::new(3);
/// let mut buffer = Vec::new();
/// io::save(&mut buffer, &layer).unwrap();
///
/// let mut restored = FullyConnected::default();
/// io::load(&mut buffer.as_slice(), &mut restored).unwrap();
/// assert_eq!(restored.id(), layer.id());
/// ```
pub fn save<W: Write>(writer: &mut W, layer: &dyn Layer) -> Result<()> {
    let mut archive = OutputArchive::new();
    layer.save(&mut archive)?;
    archive.finish(writer)?;
    tracing::debug!(id = %layer.id(), signature = layer.signature(), "layer saved");
    Ok(())
}

/// Restores `layer` from the next line of `reader`.
///
/// The loaded layer keeps its persisted id and shapes, records its producers
/// as virtual connections and no longer requires setup.
pub fn load<R: BufRead>(reader: &mut R, layer: &mut dyn Layer) -> Result<()> {
    restore(InputArchive::read_from(reader)?, layer)
}

/// Loads `layer` from an archive that was already read.
pub(crate) fn restore(mut archive: InputArchive, layer: &mut dyn Layer) -> Result<()> {
    layer.load(&mut archive)?;
    if !archive.is_exhausted() {
        return Err(Error::invalid(format!(
            "trailing records after loading `{}`",
            layer.signature()
        )));
    }
    tracing::debug!(id = %layer.id(), signature = layer.signature(), "layer loaded");
    Ok(())
}
