//! Heap-resident segments built row by row.
//!
//! Dimension columns are dictionary encoded with a sorted dictionary (ids follow the natural
//! order of their values, null first), metric columns are plain vectors with a validity bitmap.

use crate::bitmap::BitVec;
use crate::error::{TopNError, TopNResult};
use crate::segment::{Cursor, DimensionSelector, MetricSelector, Segment};
use crate::value::{DimensionValue, DimensionValueId, MetricValue, Value};
use ahash::AHashMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Dimension,
    Long,
    Double,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSchema {
    pub fn dimension(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Dimension,
        }
    }

    pub fn long(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Long,
        }
    }

    pub fn double(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Double,
        }
    }
}

#[derive(Clone, Debug)]
struct DimensionColumn {
    dictionary: Arc<[DimensionValue]>,
    /// Ids of all rows, flattened; row `r` owns `ids[row_starts[r]..row_starts[r + 1]]`.
    ids: Vec<DimensionValueId>,
    row_starts: Vec<u32>,
}

#[derive(Clone, Debug)]
struct LongColumn {
    values: Vec<i64>,
    validity: BitVec,
}

#[derive(Clone, Debug)]
struct DoubleColumn {
    values: Vec<f64>,
    validity: BitVec,
}

#[derive(Clone, Debug)]
enum Column {
    Dimension(DimensionColumn),
    Long(LongColumn),
    Double(DoubleColumn),
}

#[derive(Clone, Debug)]
pub struct InMemorySegment {
    id: String,
    schema: Vec<ColumnSchema>,
    columns: Vec<Column>,
    rows: usize,
}

impl InMemorySegment {
    pub fn schema(&self) -> &[ColumnSchema] {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    fn column(&self, name: &str) -> Option<&Column> {
        let idx = self.schema.iter().position(|c| c.name == name)?;
        self.columns.get(idx)
    }

    /// Sorted dictionary backing a dimension column.
    pub fn dictionary(&self, dimension: &str) -> Option<Arc<[DimensionValue]>> {
        match self.column(dimension)? {
            Column::Dimension(c) => Some(c.dictionary.clone()),
            _ => None,
        }
    }
}

impl Segment for InMemorySegment {
    fn id(&self) -> &str {
        &self.id
    }

    fn make_cursor(&self) -> Box<dyn Cursor + '_> {
        Box::new(MemoryCursor::new(self.rows))
    }

    fn dimension_selector(&self, dimension: &str) -> Option<Box<dyn DimensionSelector + '_>> {
        match self.column(dimension)? {
            Column::Dimension(c) => Some(Box::new(MemoryDimensionSelector { column: c })),
            _ => None,
        }
    }

    fn metric_selector(&self, column: &str) -> Option<Box<dyn MetricSelector + '_>> {
        match self.column(column)? {
            Column::Long(c) => Some(Box::new(LongSelector { column: c })),
            Column::Double(c) => Some(Box::new(DoubleSelector { column: c })),
            Column::Dimension(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MemoryCursor {
    rows: usize,
    position: Option<usize>,
    done: bool,
}

impl MemoryCursor {
    pub fn new(rows: usize) -> Self {
        Self {
            rows,
            position: None,
            done: false,
        }
    }
}

impl Cursor for MemoryCursor {
    fn advance(&mut self) -> bool {
        if self.done {
            return false;
        }
        let next = self.position.map_or(0, |p| p + 1);
        if next < self.rows {
            self.position = Some(next);
            true
        } else {
            self.done = true;
            false
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn offset(&self) -> usize {
        self.position.unwrap_or(0)
    }

    fn reset(&mut self) {
        self.position = None;
        self.done = false;
    }
}

struct MemoryDimensionSelector<'a> {
    column: &'a DimensionColumn,
}

impl DimensionSelector for MemoryDimensionSelector<'_> {
    fn cardinality(&self) -> usize {
        self.column.dictionary.len()
    }

    fn value_ids(&self, offset: usize) -> &[DimensionValueId] {
        let starts = &self.column.row_starts;
        let (Some(&start), Some(&end)) = (starts.get(offset), starts.get(offset + 1)) else {
            return &[];
        };
        &self.column.ids[start as usize..end as usize]
    }

    fn lookup_value(&self, id: DimensionValueId) -> DimensionValue {
        self.column
            .dictionary
            .get(id as usize)
            .cloned()
            .unwrap_or(DimensionValue::Null)
    }
}

struct LongSelector<'a> {
    column: &'a LongColumn,
}

impl MetricSelector for LongSelector<'_> {
    fn value(&self, offset: usize) -> Option<MetricValue> {
        let v = *self.column.values.get(offset)?;
        self.column
            .validity
            .get(offset)
            .then_some(MetricValue::Long(v))
    }
}

struct DoubleSelector<'a> {
    column: &'a DoubleColumn,
}

impl MetricSelector for DoubleSelector<'_> {
    fn value(&self, offset: usize) -> Option<MetricValue> {
        let v = *self.column.values.get(offset)?;
        self.column
            .validity
            .get(offset)
            .then_some(MetricValue::Double(v))
    }
}

pub struct InMemorySegmentBuilder {
    id: String,
    schema: Vec<ColumnSchema>,
    builders: Vec<ColumnBuilder>,
    rows: usize,
}

enum ColumnBuilder {
    Dimension(DictBuilder),
    Long(LongBuilder),
    Double(DoubleBuilder),
}

struct DictBuilder {
    /// Most dictionary entries and row ids the column may hold.
    limit: usize,
    dictionary: Vec<DimensionValue>,
    dict_map: AHashMap<DimensionValue, DimensionValueId>,
    ids: Vec<DimensionValueId>,
    row_starts: Vec<u32>,
}

struct LongBuilder {
    values: Vec<i64>,
    validity: BitVec,
}

struct DoubleBuilder {
    values: Vec<f64>,
    validity: BitVec,
}

impl InMemorySegmentBuilder {
    pub fn new(id: impl Into<String>, schema: Vec<ColumnSchema>) -> Self {
        let builders = schema
            .iter()
            .map(|col| match col.column_type {
                ColumnType::Dimension => ColumnBuilder::Dimension(DictBuilder::new()),
                ColumnType::Long => ColumnBuilder::Long(LongBuilder::new()),
                ColumnType::Double => ColumnBuilder::Double(DoubleBuilder::new()),
            })
            .collect();

        Self {
            id: id.into(),
            schema,
            builders,
            rows: 0,
        }
    }

    pub fn append_row(&mut self, row: &[Value]) -> TopNResult<()> {
        if row.len() != self.builders.len() {
            return Err(TopNError::SchemaMismatch {
                segment: self.id.clone(),
                expected: self.builders.len(),
                actual: row.len(),
            });
        }

        for ((builder, schema), value) in self.builders.iter().zip(&self.schema).zip(row) {
            if let ColumnBuilder::Dimension(b) = builder {
                if !b.fits(value) {
                    return Err(TopNError::DimensionOverflow {
                        segment: self.id.clone(),
                        column: schema.name.clone(),
                    });
                }
            }
        }

        for (builder, value) in self.builders.iter_mut().zip(row.iter()) {
            match builder {
                ColumnBuilder::Dimension(b) => b.push(value),
                ColumnBuilder::Long(b) => b.push(value),
                ColumnBuilder::Double(b) => b.push(value),
            }
        }
        self.rows += 1;
        Ok(())
    }

    pub fn finalize(self) -> InMemorySegment {
        let columns = self
            .builders
            .into_iter()
            .map(|builder| match builder {
                ColumnBuilder::Dimension(b) => Column::Dimension(b.finish()),
                ColumnBuilder::Long(b) => Column::Long(LongColumn {
                    values: b.values,
                    validity: b.validity,
                }),
                ColumnBuilder::Double(b) => Column::Double(DoubleColumn {
                    values: b.values,
                    validity: b.validity,
                }),
            })
            .collect();

        InMemorySegment {
            id: self.id,
            schema: self.schema,
            columns,
            rows: self.rows,
        }
    }
}

impl DictBuilder {
    fn new() -> Self {
        Self {
            limit: u32::MAX as usize,
            dictionary: Vec::new(),
            dict_map: AHashMap::new(),
            ids: Vec::new(),
            row_starts: vec![0],
        }
    }

    /// Whether `value` can be appended without running out of 32-bit ids.
    fn fits(&self, value: &Value) -> bool {
        let unseen = |v: DimensionValue| usize::from(!self.dict_map.contains_key(&v));
        let (new_values, new_ids) = match value {
            Value::String(s) => (unseen(DimensionValue::String(s.clone())), 1),
            Value::Multi(values) if !values.is_empty() => (
                values
                    .iter()
                    .map(|s| unseen(DimensionValue::String(s.clone())))
                    .sum::<usize>(),
                values.len(),
            ),
            _ => (unseen(DimensionValue::Null), 1),
        };
        self.dictionary.len() + new_values <= self.limit && self.ids.len() + new_ids <= self.limit
    }

    fn intern(&mut self, value: DimensionValue) -> DimensionValueId {
        if let Some(idx) = self.dict_map.get(&value) {
            return *idx;
        }

        let idx = self.dictionary.len() as DimensionValueId;
        self.dictionary.push(value.clone());
        self.dict_map.insert(value, idx);
        idx
    }

    fn push(&mut self, value: &Value) {
        match value {
            Value::String(s) => {
                let id = self.intern(DimensionValue::String(s.clone()));
                self.ids.push(id);
            }
            Value::Multi(values) if !values.is_empty() => {
                for s in values {
                    let id = self.intern(DimensionValue::String(s.clone()));
                    self.ids.push(id);
                }
            }
            // Nulls, empty multi-values and type mismatches all read back as null.
            _ => {
                let id = self.intern(DimensionValue::Null);
                self.ids.push(id);
            }
        }
        self.row_starts.push(self.ids.len() as u32);
    }

    fn finish(self) -> DimensionColumn {
        let mut order: Vec<usize> = (0..self.dictionary.len()).collect();
        order.sort_by(|&a, &b| self.dictionary[a].cmp(&self.dictionary[b]));

        let mut remap = vec![0 as DimensionValueId; order.len()];
        for (new_id, &old_id) in order.iter().enumerate() {
            remap[old_id] = new_id as DimensionValueId;
        }

        let dictionary: Vec<DimensionValue> = order
            .iter()
            .map(|&old_id| self.dictionary[old_id].clone())
            .collect();
        let ids = self.ids.iter().map(|&id| remap[id as usize]).collect();

        DimensionColumn {
            dictionary: dictionary.into(),
            ids,
            row_starts: self.row_starts,
        }
    }
}

impl LongBuilder {
    fn new() -> Self {
        Self {
            values: Vec::new(),
            validity: BitVec::new(),
        }
    }

    fn push(&mut self, value: &Value) {
        match value {
            Value::Long(v) => {
                self.values.push(*v);
                self.validity.push(true);
            }
            Value::Double(v) => {
                self.values.push(*v as i64);
                self.validity.push(true);
            }
            _ => {
                // Type mismatch: treat as null.
                self.values.push(0);
                self.validity.push(false);
            }
        }
    }
}

impl DoubleBuilder {
    fn new() -> Self {
        Self {
            values: Vec::new(),
            validity: BitVec::new(),
        }
    }

    fn push(&mut self, value: &Value) {
        match value {
            Value::Double(v) => {
                self.values.push(*v);
                self.validity.push(true);
            }
            Value::Long(v) => {
                self.values.push(*v as f64);
                self.validity.push(true);
            }
            _ => {
                self.values.push(0.0);
                self.validity.push(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment() -> InMemorySegment {
        let mut builder = InMemorySegmentBuilder::new(
            "seg",
            vec![
                ColumnSchema::dimension("page"),
                ColumnSchema::long("hits"),
                ColumnSchema::double("latency"),
            ],
        );
        let rows = [
            vec![Value::from("b"), Value::Long(1), Value::Double(0.5)],
            vec![Value::Null, Value::Null, Value::Long(2)],
            vec![Value::from(&["c", "a"][..]), Value::Long(3), Value::Null],
        ];
        for row in rows {
            builder.append_row(&row).unwrap();
        }
        builder.finalize()
    }

    #[test]
    fn dictionary_is_sorted_and_ids_are_remapped() {
        let segment = segment();
        assert_eq!(segment.row_count(), 3);

        let dict = segment.dictionary("page").unwrap();
        assert_eq!(
            dict.to_vec(),
            vec![
                DimensionValue::Null,
                DimensionValue::from("a"),
                DimensionValue::from("b"),
                DimensionValue::from("c"),
            ]
        );

        let selector = segment.dimension_selector("page").unwrap();
        assert_eq!(selector.cardinality(), 4);
        assert_eq!(selector.value_ids(0), &[2]);
        assert_eq!(selector.value_ids(1), &[0]);
        assert_eq!(selector.value_ids(2), &[3, 1]);
        assert_eq!(selector.value_ids(3), &[] as &[DimensionValueId]);
        assert_eq!(selector.lookup_value(3), DimensionValue::from("c"));
    }

    #[test]
    fn metric_selectors_respect_validity() {
        let segment = segment();
        let hits = segment.metric_selector("hits").unwrap();
        assert_eq!(hits.value(0), Some(MetricValue::Long(1)));
        assert_eq!(hits.value(1), None);
        assert_eq!(hits.value(9), None);

        let latency = segment.metric_selector("latency").unwrap();
        assert_eq!(latency.value(1), Some(MetricValue::Double(2.0)));
        assert_eq!(latency.value(2), None);

        assert!(segment.metric_selector("page").is_none());
        assert!(segment.dimension_selector("hits").is_none());
    }

    #[test]
    fn cursor_walks_every_row_and_rewinds() {
        let mut cursor = MemoryCursor::new(2);
        assert!(!cursor.is_done());
        assert!(cursor.advance());
        assert_eq!(cursor.offset(), 0);
        assert!(cursor.advance());
        assert_eq!(cursor.offset(), 1);
        assert!(!cursor.advance());
        assert!(cursor.is_done());
        assert!(!cursor.advance());

        cursor.reset();
        assert!(!cursor.is_done());
        assert!(cursor.advance());
        assert_eq!(cursor.offset(), 0);
    }

    #[test]
    fn row_width_mismatch_is_rejected() {
        let mut builder =
            InMemorySegmentBuilder::new("seg", vec![ColumnSchema::dimension("page")]);
        let err = builder
            .append_row(&[Value::from("a"), Value::Long(1)])
            .unwrap_err();
        assert_eq!(
            err,
            TopNError::SchemaMismatch {
                segment: "seg".to_string(),
                expected: 1,
                actual: 2,
            }
        );
    }

    #[test]
    fn dimension_past_the_id_space_is_rejected_without_a_partial_row() {
        let mut builder = InMemorySegmentBuilder::new(
            "seg",
            vec![ColumnSchema::long("hits"), ColumnSchema::dimension("page")],
        );
        if let ColumnBuilder::Dimension(dict) = &mut builder.builders[1] {
            dict.limit = 2;
        }
        let overflow = TopNError::DimensionOverflow {
            segment: "seg".to_string(),
            column: "page".to_string(),
        };

        builder.append_row(&[Value::Long(1), Value::from("a")]).unwrap();
        // Two new values would make three dictionary entries.
        assert_eq!(
            builder.append_row(&[Value::Long(2), Value::from(&["b", "c"][..])]),
            Err(overflow.clone())
        );
        builder.append_row(&[Value::Long(3), Value::from("b")]).unwrap();
        // Known value, but a third row id.
        assert_eq!(
            builder.append_row(&[Value::Long(4), Value::from("a")]),
            Err(overflow)
        );

        let segment = builder.finalize();
        assert_eq!(segment.row_count(), 2);
        let hits = segment.metric_selector("hits").unwrap();
        assert_eq!(hits.value(1), Some(MetricValue::Long(3)));
        assert_eq!(hits.value(2), None);
        let page = segment.dimension_selector("page").unwrap();
        assert_eq!(page.cardinality(), 2);
        assert_eq!(page.value_ids(1), &[1]);
    }
}
