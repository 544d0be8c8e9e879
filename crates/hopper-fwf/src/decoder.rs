//! Fixed-width decoding into Arrow record batches.
//!
//! Both decoders work in two passes over a `LineArena`: the first pass
//! validates every line and assigns it to a partition (one partition in the
//! single-schema case, one per discriminator in the multi-schema case), the
//! second slices each partition's columns. Lines keep file order inside
//! their partition.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringArray, StringBuilder};
use arrow::compute::cast;
use arrow::datatypes::{DataType as ArrowType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use hopper_backend::frame::to_arrow_type;
use hopper_core::error::{Error, Result};

use crate::arena::{CharLine, LineArena};
use crate::layout::{ColumnLayout, ColumnSpec};
use crate::options::{DecodeOptions, Discriminator};
use crate::reject::{Reject, RejectKind};
use crate::schema_map::SchemaMap;

/// Output of a single-schema decode.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub batch: RecordBatch,
    /// Empty unless the decode was lenient.
    pub rejects: Vec<Reject>,
}

/// Output of a multi-schema decode: one table per discriminator seen, in
/// first-encounter order.
#[derive(Debug, Clone)]
pub struct MultiDecoded {
    pub tables: Vec<(String, RecordBatch)>,
    pub rejects: Vec<Reject>,
}

impl MultiDecoded {
    pub fn table(&self, key: &str) -> Option<&RecordBatch> {
        self.tables.iter().find(|(k, _)| k == key).map(|(_, b)| b)
    }
}

#[derive(Debug, Clone)]
pub struct FixedWidthDecoder {
    layout: ColumnLayout,
    options: DecodeOptions,
    schema: SchemaRef,
}

impl FixedWidthDecoder {
    pub fn new(layout: ColumnLayout, options: DecodeOptions) -> Self {
        let schema = output_schema(&layout);
        Self {
            layout,
            options,
            schema,
        }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<Decoded> {
        self.decode_str(as_utf8(bytes)?)
    }

    pub fn decode_str(&self, text: &str) -> Result<Decoded> {
        let arena = LineArena::new(text);
        let required = self.layout.required_width();
        let mut rejects = Vec::new();
        let mut accepted = Vec::with_capacity(arena.len());

        for (idx, line) in arena.lines().iter().enumerate() {
            let actual = CharLine::new(arena.text(line)).char_len();
            if actual < required {
                let reject = Reject {
                    line: line.number,
                    raw: arena.text(line).to_string(),
                    kind: RejectKind::Truncated { required, actual },
                };
                set_aside(reject, &self.options, &mut rejects)?;
                continue;
            }
            accepted.push(idx);
        }

        let batch = slice_partition(&arena, &accepted, 0, &self.layout, &self.schema, &self.options)?;
        tracing::debug!(rows = batch.num_rows(), rejects = rejects.len(), "fixed-width decode");
        Ok(Decoded { batch, rejects })
    }
}

#[derive(Debug, Clone)]
pub struct MultiSchemaDecoder {
    window: Discriminator,
    map: SchemaMap,
    options: DecodeOptions,
    schemas: Vec<SchemaRef>,
    base: usize,
    /// Minimum line length per schema slot, counted from the line start.
    required: Vec<usize>,
}

impl MultiSchemaDecoder {
    pub fn new(window: Discriminator, map: SchemaMap, options: DecodeOptions) -> Result<Self> {
        if map.key_len() != window.length {
            return Err(Error::config(format!(
                "schema map keys have {} characters but the discriminator window is {}",
                map.key_len(),
                window.length
            )));
        }
        let base = window
            .end()
            .checked_add(options.skip_leading)
            .ok_or_else(|| Error::config("skip_leading ends past the addressable range"))?;
        let required = map
            .iter()
            .map(|(key, layout)| {
                base.checked_add(layout.required_width()).ok_or_else(|| {
                    Error::config(format!(
                        "schema '{key}' ends past the addressable range once offset by {base}"
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let schemas = map.iter().map(|(_, layout)| output_schema(layout)).collect();
        Ok(Self {
            window,
            map,
            options,
            schemas,
            base,
            required,
        })
    }

    pub fn window(&self) -> Discriminator {
        self.window
    }

    pub fn schema_map(&self) -> &SchemaMap {
        &self.map
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Where schema offsets start counting within a line.
    pub fn base(&self) -> usize {
        self.base
    }

    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<MultiDecoded> {
        self.decode_str(as_utf8(bytes)?)
    }

    pub fn decode_str(&self, text: &str) -> Result<MultiDecoded> {
        let arena = LineArena::new(text);
        let base = self.base();
        let slots: HashMap<&str, usize> = self.map.keys().enumerate().map(|(i, k)| (k, i)).collect();

        let mut partitions: Vec<Vec<usize>> = vec![Vec::new(); self.map.len()];
        let mut encounter: Vec<usize> = Vec::new();
        let mut rejects = Vec::new();

        for (idx, line) in arena.lines().iter().enumerate() {
            let text = arena.text(line);
            let chars = CharLine::new(text);
            let actual = chars.char_len();

            if actual < self.window.end() {
                let reject = Reject {
                    line: line.number,
                    raw: text.to_string(),
                    kind: RejectKind::Truncated {
                        required: self.window.end(),
                        actual,
                    },
                };
                set_aside(reject, &self.options, &mut rejects)?;
                continue;
            }

            let key = chars.slice(self.window.offset, self.window.length);
            let Some(&slot) = slots.get(key) else {
                let reject = Reject {
                    line: line.number,
                    raw: text.to_string(),
                    kind: RejectKind::Unmatched {
                        discriminator: key.to_string(),
                    },
                };
                set_aside(reject, &self.options, &mut rejects)?;
                continue;
            };

            let required = self.required[slot];
            if actual < required {
                let reject = Reject {
                    line: line.number,
                    raw: text.to_string(),
                    kind: RejectKind::Truncated { required, actual },
                };
                set_aside(reject, &self.options, &mut rejects)?;
                continue;
            }

            if partitions[slot].is_empty() {
                encounter.push(slot);
            }
            partitions[slot].push(idx);
        }

        let mut tables = Vec::with_capacity(encounter.len());
        for slot in encounter {
            let Some((key, layout)) = self.map.entry(slot) else {
                continue;
            };
            let batch = slice_partition(
                &arena,
                &partitions[slot],
                base,
                layout,
                &self.schemas[slot],
                &self.options,
            )?;
            tracing::debug!(key, rows = batch.num_rows(), "fixed-width partition decoded");
            tables.push((key.to_string(), batch));
        }
        Ok(MultiDecoded { tables, rejects })
    }
}

fn as_utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| Error::Decode(format!("input is not UTF-8: {e}")))
}

fn set_aside(reject: Reject, options: &DecodeOptions, rejects: &mut Vec<Reject>) -> Result<()> {
    if options.is_lenient() {
        rejects.push(reject);
        Ok(())
    } else {
        Err(reject.to_error())
    }
}

fn output_schema(layout: &ColumnLayout) -> SchemaRef {
    let fields: Vec<Field> = layout
        .columns()
        .iter()
        .map(|c| {
            let dt = c.dtype.map(to_arrow_type).unwrap_or(ArrowType::Utf8);
            Field::new(&c.name, dt, true)
        })
        .collect();
    Arc::new(Schema::new(fields))
}

/// Pass two: cut every column of the given lines.
fn slice_partition(
    arena: &LineArena<'_>,
    rows: &[usize],
    base: usize,
    layout: &ColumnLayout,
    schema: &SchemaRef,
    options: &DecodeOptions,
) -> Result<RecordBatch> {
    let mut builders: Vec<StringBuilder> = layout
        .columns()
        .iter()
        .map(|c| StringBuilder::with_capacity(rows.len(), rows.len().saturating_mul(c.width.min(64))))
        .collect();

    for &idx in rows {
        let chars = CharLine::new(arena.text(arena.get(idx)));
        for (col, builder) in layout.columns().iter().zip(builders.iter_mut()) {
            let field = options.strip(chars.slice(base + col.offset, col.width));
            if options.empty_as_null && field.is_empty() {
                builder.append_null();
            } else {
                builder.append_value(field);
            }
        }
    }

    let arrays = layout
        .columns()
        .iter()
        .zip(builders)
        .map(|(col, mut builder)| {
            let text = builder.finish();
            typed_column(col, text, |row| arena.get(rows[row]).number)
        })
        .collect::<Result<Vec<_>>>()?;

    let batch_options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    RecordBatch::try_new_with_options(Arc::clone(schema), arrays, &batch_options)
        .map_err(|e| Error::Decode(e.to_string()))
}

fn typed_column(
    col: &ColumnSpec,
    text: StringArray,
    line_of: impl Fn(usize) -> usize,
) -> Result<ArrayRef> {
    let target = match col.dtype {
        None => return Ok(Arc::new(text)),
        Some(dt) => to_arrow_type(dt),
    };
    if target == ArrowType::Utf8 {
        return Ok(Arc::new(text));
    }

    let cast_to = cast(&text, &target)
        .map_err(|e| Error::Decode(format!("column '{}': {e}", col.name)))?;

    // Safe casts turn unparsable values into nulls; find the first one.
    if cast_to.null_count() > text.null_count() {
        if let Some(row) = (0..text.len()).find(|&i| text.is_valid(i) && cast_to.is_null(i)) {
            return Err(Error::Decode(format!(
                "line {}, column '{}': cannot parse '{}' as {}",
                line_of(row),
                col.name,
                text.value(row),
                target
            )));
        }
    }
    Ok(cast_to)
}
