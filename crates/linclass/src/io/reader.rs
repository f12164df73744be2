//! Tab-separated training data reader.
//!
//! Binary and multiclass sources hold one instance per line:
//!
//! ```text
//! label[:weight] TAB attribute[:value] TAB ...
//! ```
//!
//! Selection and ranking sources group candidate lines into blocks:
//!
//! ```text
//! @boi[:weight]
//! [+]label TAB attribute[:value] ...
//! ...
//! @eoi
//! ```
//!
//! where a leading `+` marks the true candidate. Lines starting with `#` are
//! comments and empty lines are ignored; a line of bare tabs has an empty
//! label and is rejected. The rightmost `:` separates a name from its value.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use regex::Regex;

use crate::data_handling::{Candidate, Dataset, Instance, SparseVector, TaskKind, UNKNOWN_LABEL};
use crate::error::{ClassifierError, Result};

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Value of the bias attribute appended to every attribute vector; `0.0` disables it.
    pub bias: f64,
    /// Keep only attributes whose name matches this regular expression.
    pub filter: Option<String>,
}

fn invalid(line: usize, message: impl Into<String>) -> ClassifierError {
    ClassifierError::InvalidData {
        line,
        message: message.into(),
    }
}

/// Splits `name[:value]` at the rightmost colon; the value defaults to 1.
fn name_value(field: &str, line: usize) -> Result<(&str, f64)> {
    match field.rsplit_once(':') {
        Some((name, value)) => value
            .parse::<f64>()
            .map(|v| (name, v))
            .map_err(|_| invalid(line, format!("invalid value '{}' in '{}'", value, field))),
        None => Ok((field, 1.0)),
    }
}

fn attributes<'r>(
    data: &mut Dataset,
    fields: impl Iterator<Item = &'r str>,
    line: usize,
    options: &ReadOptions,
    filter: Option<&Regex>,
) -> Result<SparseVector> {
    let mut v = SparseVector::new();
    for field in fields.filter(|f| !f.is_empty()) {
        let (name, value) = name_value(field, line)?;
        if filter.is_some_and(|re| !re.is_match(name)) {
            continue;
        }
        // Unknown to a frozen table: no weight can exist for it.
        if let Some(id) = data.attributes.intern(name) {
            v.push(id, value);
        }
    }
    if options.bias != 0.0 {
        v.push(0, options.bias);
    }
    Ok(v)
}

fn labeled_instance(
    data: &mut Dataset,
    record: &StringRecord,
    line: usize,
    options: &ReadOptions,
    filter: Option<&Regex>,
) -> Result<Instance> {
    let mut fields = record.iter();
    let head = fields.next().ok_or_else(|| invalid(line, "no field found in the line"))?;
    if head.is_empty() {
        return Err(invalid(line, "an empty label found"));
    }
    let (label, weight) = name_value(head, line)?;
    let attrs = attributes(data, fields, line, options, filter)?;

    let inst = match data.kind {
        TaskKind::Binary => match label {
            "+1" | "1" => Instance::binary(true, attrs),
            "-1" => Instance::binary(false, attrs),
            _ => return Err(invalid(line, format!("a class label must be -1, +1 or 1: '{}'", label))),
        },
        _ => Instance::multiclass(data.labels.intern(label), attrs),
    };
    Ok(inst.with_weight(weight))
}

struct Block {
    weight: f64,
    line: usize,
    candidates: Vec<Candidate>,
}

/// Compiles the attribute filter of `options`, if any.
fn compile_filter(options: &ReadOptions) -> Result<Option<Regex>> {
    options
        .filter
        .as_deref()
        .map(|pattern| {
            Regex::new(pattern).map_err(|_| ClassifierError::InvalidParameter {
                name: "filter".to_string(),
                value: pattern.to_string(),
            })
        })
        .transpose()
}

/// Reads every instance of `source` into `data` under `group`.
///
/// Reserves the bias attribute first when `options.bias` is non-zero.
/// Returns the number of instances read.
pub fn read_source<R: Read>(
    data: &mut Dataset,
    source: R,
    group: i32,
    options: &ReadOptions,
) -> Result<usize> {
    let filter = compile_filter(options)?;
    data.reserve_bias(options.bias)?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .comment(Some(b'#'))
        .from_reader(source);

    let blocks = matches!(data.kind, TaskKind::Selection | TaskKind::Ranking);
    let mut record = StringRecord::new();
    let mut block: Option<Block> = None;
    let mut count = 0;

    while reader.read_record(&mut record)? {
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        if record.len() == 1 && record[0].is_empty() {
            continue;
        }

        if !blocks {
            let inst = labeled_instance(data, &record, line, options, filter.as_ref())?;
            data.push(inst.with_group(group));
            count += 1;
            continue;
        }

        let head = &record[0];
        if let Some(rest) = head.strip_prefix("@boi") {
            if block.is_some() {
                return Err(invalid(line, "@boi found inside an instance block"));
            }
            let weight = match rest.strip_prefix(':') {
                Some(w) => w
                    .parse()
                    .map_err(|_| invalid(line, format!("invalid instance weight '{}'", w)))?,
                None if rest.is_empty() => 1.0,
                None => return Err(invalid(line, format!("unknown directive '{}'", head))),
            };
            block = Some(Block {
                weight,
                line,
                candidates: Vec::new(),
            });
        } else if head == "@eoi" {
            let b = block
                .take()
                .ok_or_else(|| invalid(line, "@eoi found without a matching @boi"))?;
            if b.candidates.iter().filter(|c| c.truth).count() > 1 {
                return Err(invalid(b.line, "more than one true candidate in an instance"));
            }
            data.push(
                Instance::ranked(b.candidates)
                    .with_weight(b.weight)
                    .with_group(group),
            );
            count += 1;
        } else {
            let b = block
                .as_mut()
                .ok_or_else(|| invalid(line, "a candidate found outside of an instance block"))?;
            let (truth, label) = match head.strip_prefix('+') {
                Some(label) => (true, label),
                None => (false, head),
            };
            if label.is_empty() {
                return Err(invalid(line, "an empty label found"));
            }
            let label = data.labels.intern(label).unwrap_or(UNKNOWN_LABEL);
            let attrs = attributes(data, record.iter().skip(1), line, options, filter.as_ref())?;
            b.candidates.push(Candidate {
                label,
                attributes: attrs,
                truth,
            });
        }
    }

    if let Some(b) = block {
        return Err(invalid(b.line, "an instance block is not terminated by @eoi"));
    }
    Ok(count)
}

/// Reads `paths` in order; the i-th file becomes group `i`.
pub fn read_files<P: AsRef<Path>>(data: &mut Dataset, paths: &[P], options: &ReadOptions) -> Result<()> {
    for (i, path) in paths.iter().enumerate() {
        let path = path.as_ref();
        log::info!("Reading the data set from {}", path.display());
        let file = File::open(path)?;
        let n = read_source(data, file, i as i32, options)?;
        log::info!("{} instances read from {}", n, path.display());
    }
    log::debug!(
        "{} attributes and {} labels interned",
        data.attributes.len(),
        data.labels.len()
    );
    Ok(())
}
