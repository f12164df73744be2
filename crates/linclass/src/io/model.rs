//! Plain-text model files.
//!
//! ```text
//! @linclass TAB linear TAB binary
//! <weight> TAB <attribute>
//! ```
//!
//! or, for label-aware models,
//!
//! ```text
//! @linclass TAB linear TAB multi TAB <attribute-label | attribute>
//! @label TAB <label>
//! <weight> TAB <attribute> [TAB <label>]
//! ```
//!
//! Only non-zero weights are stored. The bias weight is stored multiplied by
//! the bias value.
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use csv::StringRecord;
use ndarray::{Array1, ArrayView1};

use crate::data_handling::{Dataset, TaskKind, BIAS_ATTRIBUTE};
use crate::error::{ClassifierError, Result};
use crate::features::FeatureSpace;
use crate::quark::Quark;

const MAGIC: &str = "@linclass";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Binary,
    /// Label-aware model; `expanded` is true for attribute x label features.
    Multi { expanded: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelEntry {
    pub weight: f64,
    pub attribute: String,
    pub label: Option<String>,
}

/// A model file as read from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    pub kind: ModelKind,
    pub labels: Vec<String>,
    pub entries: Vec<ModelEntry>,
}

fn format_error(line: usize, message: impl Into<String>) -> ClassifierError {
    ClassifierError::ModelFormat {
        line,
        message: message.into(),
    }
}

fn model_kind(data: &Dataset) -> ModelKind {
    match data.kind {
        TaskKind::Binary => ModelKind::Binary,
        _ => ModelKind::Multi {
            expanded: data.features().is_expanded(),
        },
    }
}

/// Writes the non-zero `weights` of a model trained on `data`.
pub fn write_model<W: Write>(mut out: W, data: &Dataset, weights: ArrayView1<f64>) -> Result<()> {
    data.require_finalized()?;
    let kind = model_kind(data);
    match kind {
        ModelKind::Binary => writeln!(out, "{}\tlinear\tbinary", MAGIC)?,
        ModelKind::Multi { .. } => {
            writeln!(out, "{}\tlinear\tmulti\t{}", MAGIC, data.features().name())?;
            for (_, label) in data.labels.iter() {
                writeln!(out, "@label\t{}", label)?;
            }
        }
    }

    for (fid, &w) in weights.iter().enumerate() {
        if w == 0.0 {
            continue;
        }
        let Some((attr, label)) = data.features().backward(fid) else {
            continue;
        };
        let name = data.attributes.resolve(attr)?;
        let w = if name == BIAS_ATTRIBUTE && data.bias() != 0.0 {
            w * data.bias()
        } else {
            w
        };
        match label {
            Some(l) => writeln!(out, "{}\t{}\t{}", w, name, data.labels.resolve(l)?)?,
            None => writeln!(out, "{}\t{}", w, name)?,
        }
    }
    out.flush()?;
    Ok(())
}

pub fn save_model<P: AsRef<Path>>(path: P, data: &Dataset, weights: ArrayView1<f64>) -> Result<()> {
    let file = File::create(path)?;
    write_model(BufWriter::new(file), data, weights)
}

pub fn read_model<R: Read>(source: R) -> Result<LinearModel> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(source);
    let mut record = StringRecord::new();

    let mut kind = None;
    let mut labels = Vec::new();
    let mut entries = Vec::new();
    while reader.read_record(&mut record)? {
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        let fields: Vec<&str> = record.iter().collect();

        let Some(kind) = kind else {
            kind = Some(match fields.as_slice() {
                [MAGIC, "linear", "binary"] => ModelKind::Binary,
                [MAGIC, "linear", "multi", "attribute-label"] => ModelKind::Multi { expanded: true },
                [MAGIC, "linear", "multi", "attribute"] => ModelKind::Multi { expanded: false },
                _ => return Err(format_error(line, "unrecognized model header")),
            });
            continue;
        };

        if fields[0] == "@label" {
            let label = fields
                .get(1)
                .ok_or_else(|| format_error(line, "missing label name"))?;
            labels.push(label.to_string());
            continue;
        }

        let weight: f64 = fields[0]
            .parse()
            .map_err(|_| format_error(line, format!("invalid weight '{}'", fields[0])))?;
        let entry = match (kind, fields.len()) {
            (ModelKind::Multi { expanded: true }, 3) => ModelEntry {
                weight,
                attribute: fields[1].to_string(),
                label: Some(fields[2].to_string()),
            },
            (ModelKind::Binary, 2) | (ModelKind::Multi { expanded: false }, 2) => ModelEntry {
                weight,
                attribute: fields[1].to_string(),
                label: None,
            },
            _ => return Err(format_error(line, "unexpected number of fields")),
        };
        entries.push(entry);
    }

    let kind = kind.ok_or_else(|| format_error(0, "empty model file"))?;
    Ok(LinearModel {
        kind,
        labels,
        entries,
    })
}

pub fn load_model<P: AsRef<Path>>(path: P) -> Result<LinearModel> {
    read_model(File::open(path)?)
}

impl LinearModel {
    /// Task a model of this kind is usually applied to.
    pub fn default_task(&self) -> TaskKind {
        match self.kind {
            ModelKind::Binary => TaskKind::Binary,
            ModelKind::Multi { expanded: true } => TaskKind::Multiclass,
            ModelKind::Multi { expanded: false } => TaskKind::Ranking,
        }
    }

    fn supports(&self, task: TaskKind) -> bool {
        matches!(
            (self.kind, task),
            (ModelKind::Binary, TaskKind::Binary)
                | (ModelKind::Multi { expanded: true }, TaskKind::Multiclass)
                | (ModelKind::Multi { expanded: true }, TaskKind::Selection)
                | (ModelKind::Multi { expanded: false }, TaskKind::Ranking)
        )
    }
}

impl Dataset {
    /// Frozen, finalized dataset with the tables of `model`, plus its weights.
    ///
    /// Reading data into the returned dataset never grows its tables.
    pub fn frozen_from_model(
        model: &LinearModel,
        task: TaskKind,
        bias: f64,
        negative_labels: &[String],
    ) -> Result<(Dataset, Array1<f64>)> {
        if !model.supports(task) {
            return Err(format_error(
                0,
                format!("a {:?} model cannot be applied to a {} task", model.kind, task),
            ));
        }

        let mut attributes = Quark::new();
        if bias != 0.0 {
            attributes.intern(BIAS_ATTRIBUTE);
        }
        let mut labels = Quark::new();
        match model.kind {
            ModelKind::Binary => {
                labels.intern("-1");
                labels.intern("+1");
            }
            ModelKind::Multi { .. } => {
                for l in &model.labels {
                    labels.intern(l);
                }
            }
        }

        let mut space = match model.kind {
            ModelKind::Multi { expanded: true } => FeatureSpace::expanded(),
            _ => FeatureSpace::identity(0),
        };
        if bias != 0.0 && space.is_expanded() {
            for l in 0..labels.len() {
                space.assign(0, l);
            }
        }

        let mut fids = Vec::with_capacity(model.entries.len());
        for entry in &model.entries {
            let attr = attributes
                .intern(&entry.attribute)
                .ok_or_else(|| format_error(0, "attribute table is frozen"))?;
            let label = match &entry.label {
                Some(name) => labels.lookup(name).ok_or_else(|| {
                    format_error(0, format!("label '{}' is not declared by @label", name))
                })?,
                None => 0,
            };
            fids.push(space.assign(attr, label));
        }
        if !space.is_expanded() {
            space = FeatureSpace::identity(attributes.len());
        }

        let mut weights = Array1::zeros(space.len());
        for (entry, fid) in model.entries.iter().zip(fids) {
            weights[fid] = if entry.attribute == BIAS_ATTRIBUTE && bias != 0.0 {
                entry.weight / bias
            } else {
                entry.weight
            };
        }

        let data = Dataset::frozen(task, attributes, labels, space, bias, negative_labels);
        log::info!(
            "Loaded a {} model: {} attributes, {} labels, {} features",
            task,
            data.attributes.len(),
            data.num_labels(),
            data.num_features()
        );
        Ok((data, weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::{Instance, SparseVector};

    fn trained() -> (Dataset, Array1<f64>) {
        let mut data = Dataset::new(TaskKind::Multiclass);
        data.reserve_bias(2.0).unwrap();
        let a = data.attributes.intern("a").unwrap();
        let x = data.labels.intern("X").unwrap();
        let y = data.labels.intern("Y").unwrap();
        data.push(Instance::multiclass(Some(x), SparseVector::from(vec![(a, 1.0), (0, 2.0)])));
        data.push(Instance::multiclass(Some(y), SparseVector::from(vec![(0, 2.0)])));
        data.finalize(&[]);
        // Features: (bias, X), (bias, Y), (a, X).
        let weights = Array1::from(vec![0.5, 0.0, -1.25]);
        (data, weights)
    }

    #[test]
    fn model_file_layout() {
        let (data, weights) = trained();
        let mut buf = Vec::new();
        write_model(&mut buf, &data, weights.view()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "@linclass\tlinear\tmulti\tattribute-label\n@label\tX\n@label\tY\n1\t__BIAS__\tX\n-1.25\ta\tX\n"
        );
    }

    #[test]
    fn weights_survive_a_round_trip() {
        let (data, weights) = trained();
        let mut buf = Vec::new();
        write_model(&mut buf, &data, weights.view()).unwrap();
        let model = read_model(buf.as_slice()).unwrap();
        assert_eq!(model.default_task(), TaskKind::Multiclass);

        let (frozen, restored) =
            Dataset::frozen_from_model(&model, TaskKind::Multiclass, 2.0, &[]).unwrap();
        assert!(frozen.attributes.is_frozen());
        for (fid, w) in weights.iter().enumerate() {
            let (attr, label) = data.features().backward(fid).unwrap();
            let name = data.attributes.resolve(attr).unwrap();
            let label = data.labels.resolve(label.unwrap()).unwrap();
            let a = frozen.attributes.lookup(name);
            let l = frozen.labels.lookup(label).unwrap();
            let got = a
                .and_then(|a| frozen.features().forward(a, l))
                .map(|f| restored[f])
                .unwrap_or(0.0);
            assert_eq!(got, *w);
        }
    }

    #[test]
    fn binary_model_rejects_multiclass_task() {
        let model = read_model("@linclass\tlinear\tbinary\n0.5\tfoo\n".as_bytes()).unwrap();
        assert!(Dataset::frozen_from_model(&model, TaskKind::Multiclass, 0.0, &[]).is_err());
        let (data, w) = Dataset::frozen_from_model(&model, TaskKind::Binary, 0.0, &[]).unwrap();
        assert_eq!(data.attributes.lookup("foo"), Some(0));
        assert_eq!(w[0], 0.5);
    }

    #[test]
    fn bad_header_is_reported() {
        let err = read_model("@classias\tlinear\tbinary\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ClassifierError::ModelFormat { line: 1, .. }));
    }
}
