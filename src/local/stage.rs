//! Pipeline stages understood by the in-process evaluator.

use std::cmp::Ordering;
use std::collections::HashMap;

use mongodb::bson::{Bson, Document};

use super::expression::{evaluate, integer, Scope};
use super::ordering::{as_f64, as_i64, canonical_key, compare, get_path, set_path};
use super::query;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub enum Stage {
    Match(Document),
    Group(GroupStage),
    Project(ProjectStage),
    AddFields(Document),
    Sort(Vec<(String, SortDirection)>),
    Unwind(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct GroupStage {
    id: Bson,
    accumulators: Vec<(String, AccumulatorKind, Bson)>,
}

#[derive(Debug, Clone, Copy)]
enum AccumulatorKind {
    Sum,
    Avg,
    Max,
    Push,
}

#[derive(Debug, Clone)]
pub struct ProjectStage {
    include_id: bool,
    mode: ProjectMode,
}

#[derive(Debug, Clone)]
enum ProjectMode {
    /// Kept and computed fields, in declaration order
    Include(Vec<(String, Option<Bson>)>),
    Exclude(Vec<String>),
}

fn stage_error(message: impl Into<String>) -> Error {
    Error::Evaluation(message.into())
}

impl Stage {
    pub fn parse(stage: &Document) -> Result<Self> {
        let mut entries = stage.iter();
        let (name, spec) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => return Err(stage_error("each stage must have exactly one operator")),
        };

        let as_doc = || {
            spec.as_document()
                .cloned()
                .ok_or_else(|| stage_error(format!("{} needs a document", name)))
        };

        match name.as_str() {
            "$match" => Ok(Stage::Match(as_doc()?)),
            "$group" => GroupStage::parse(&as_doc()?).map(Stage::Group),
            "$project" => ProjectStage::parse(&as_doc()?).map(Stage::Project),
            "$addFields" => Ok(Stage::AddFields(as_doc()?)),
            "$sort" => parse_sort(&as_doc()?).map(Stage::Sort),
            "$unwind" => parse_unwind(spec).map(Stage::Unwind),
            other => Err(stage_error(format!("unsupported pipeline stage: {}", other))),
        }
    }

    pub fn execute(&self, docs: Vec<Document>) -> Result<Vec<Document>> {
        match self {
            Stage::Match(filter) => {
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if query::matches(filter, &doc)? {
                        kept.push(doc);
                    }
                }
                Ok(kept)
            }
            Stage::Group(group) => group.execute(docs),
            Stage::Project(project) => docs.iter().map(|d| project.apply(d)).collect(),
            Stage::AddFields(fields) => docs.into_iter().map(|d| add_fields(fields, d)).collect(),
            Stage::Sort(keys) => Ok(sort(keys, docs)),
            Stage::Unwind(path) => Ok(unwind(path, docs)),
        }
    }
}

fn field_reference(spec: &Bson) -> Option<&str> {
    spec.as_str().and_then(|s| s.strip_prefix('$'))
}

// ---------------------------------------------------------------- $group

struct GroupState {
    key: Bson,
    values: Vec<Accumulated>,
}

enum Accumulated {
    Sum { int: i64, float: f64, is_float: bool },
    Avg { total: f64, count: u64 },
    Max(Option<Bson>),
    Push(Vec<Bson>),
}

impl Accumulated {
    fn new(kind: AccumulatorKind) -> Self {
        match kind {
            AccumulatorKind::Sum => Accumulated::Sum {
                int: 0,
                float: 0.0,
                is_float: false,
            },
            AccumulatorKind::Avg => Accumulated::Avg {
                total: 0.0,
                count: 0,
            },
            AccumulatorKind::Max => Accumulated::Max(None),
            AccumulatorKind::Push => Accumulated::Push(Vec::new()),
        }
    }

    fn add(&mut self, value: Option<Bson>) {
        match self {
            // non-numeric values are ignored by $sum and $avg
            Accumulated::Sum {
                int,
                float,
                is_float,
            } => match value.as_ref() {
                Some(Bson::Double(f)) => {
                    *is_float = true;
                    *float += f;
                }
                Some(v) => {
                    if let Some(n) = as_i64(v) {
                        match int.checked_add(n) {
                            Some(sum) => *int = sum,
                            None => {
                                *is_float = true;
                                *float += n as f64;
                            }
                        }
                    }
                }
                None => {}
            },
            Accumulated::Avg { total, count } => {
                if let Some(n) = value.as_ref().and_then(as_f64) {
                    *total += n;
                    *count += 1;
                }
            }
            Accumulated::Max(current) => {
                if let Some(v) = value.filter(|v| !matches!(v, Bson::Null | Bson::Undefined)) {
                    let replace = current
                        .as_ref()
                        .map(|c| compare(&v, c) == Ordering::Greater)
                        .unwrap_or(true);
                    if replace {
                        *current = Some(v);
                    }
                }
            }
            Accumulated::Push(items) => {
                if let Some(v) = value {
                    items.push(v);
                }
            }
        }
    }

    fn finish(self) -> Bson {
        match self {
            Accumulated::Sum {
                int,
                float,
                is_float,
            } => {
                if is_float {
                    Bson::Double(float + int as f64)
                } else {
                    integer(int)
                }
            }
            Accumulated::Avg { total, count } => {
                if count == 0 {
                    Bson::Null
                } else {
                    Bson::Double(total / count as f64)
                }
            }
            Accumulated::Max(value) => value.unwrap_or(Bson::Null),
            Accumulated::Push(items) => Bson::Array(items),
        }
    }
}

impl GroupStage {
    fn parse(spec: &Document) -> Result<Self> {
        let id = spec
            .get("_id")
            .cloned()
            .ok_or_else(|| stage_error("$group needs an _id"))?;

        let mut accumulators = Vec::new();
        for (field, acc) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
            let acc = acc
                .as_document()
                .filter(|d| d.len() == 1)
                .ok_or_else(|| stage_error(format!("accumulator for {} must be one operator", field)))?;
            let (op, expr) = acc
                .iter()
                .next()
                .ok_or_else(|| stage_error(format!("empty accumulator for {}", field)))?;
            let kind = match op.as_str() {
                "$sum" => AccumulatorKind::Sum,
                "$avg" => AccumulatorKind::Avg,
                "$max" => AccumulatorKind::Max,
                "$push" => AccumulatorKind::Push,
                other => return Err(stage_error(format!("unsupported accumulator: {}", other))),
            };
            accumulators.push((field.clone(), kind, expr.clone()));
        }

        Ok(Self { id, accumulators })
    }

    /// Groups come out in first-seen order.
    fn execute(&self, docs: Vec<Document>) -> Result<Vec<Document>> {
        let mut groups: Vec<GroupState> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for doc in &docs {
            let scope = Scope::new(doc);
            let key = evaluate(&self.id, &scope)?.unwrap_or(Bson::Null);

            let index = *positions.entry(canonical_key(&key)).or_insert_with(|| {
                groups.push(GroupState {
                    key,
                    values: self
                        .accumulators
                        .iter()
                        .map(|(_, kind, _)| Accumulated::new(*kind))
                        .collect(),
                });
                groups.len() - 1
            });

            for ((_, _, expr), value) in self.accumulators.iter().zip(groups[index].values.iter_mut()) {
                value.add(evaluate(expr, &scope)?);
            }
        }

        Ok(groups
            .into_iter()
            .map(|group| {
                let mut out = Document::new();
                out.insert("_id", group.key);
                for ((name, _, _), value) in self.accumulators.iter().zip(group.values) {
                    out.insert(name.clone(), value.finish());
                }
                out
            })
            .collect())
    }
}

// ---------------------------------------------------------------- $project

fn flag(value: &Bson) -> Option<bool> {
    match value {
        Bson::Boolean(b) => Some(*b),
        other => as_f64(other).map(|n| n != 0.0),
    }
}

impl ProjectStage {
    fn parse(spec: &Document) -> Result<Self> {
        let mut include_id = true;
        let mut kept = Vec::new();
        let mut excluded = Vec::new();

        for (field, value) in spec {
            match (field.as_str(), flag(value)) {
                ("_id", Some(include)) => include_id = include,
                (_, Some(true)) => kept.push((field.clone(), None)),
                (_, Some(false)) => excluded.push(field.clone()),
                (_, None) => kept.push((field.clone(), Some(value.clone()))),
            }
        }

        let mode = match (kept.is_empty(), excluded.is_empty()) {
            // `{"_id": 0}` alone only drops `_id`
            (true, true) if !include_id => ProjectMode::Exclude(excluded),
            (_, true) => ProjectMode::Include(kept),
            (true, false) => ProjectMode::Exclude(excluded),
            (false, false) => {
                return Err(stage_error(
                    "$project cannot mix inclusion and exclusion (except _id)",
                ))
            }
        };
        Ok(Self { include_id, mode })
    }

    fn apply(&self, doc: &Document) -> Result<Document> {
        match &self.mode {
            ProjectMode::Include(fields) => {
                let mut out = Document::new();
                if self.include_id {
                    if let Some(id) = doc.get("_id") {
                        out.insert("_id", id.clone());
                    }
                }
                let scope = Scope::new(doc);
                for (field, expr) in fields {
                    let value = match expr {
                        None => get_path(doc, field).cloned(),
                        Some(expr) => evaluate(expr, &scope)?,
                    };
                    if let Some(value) = value {
                        set_path(&mut out, field, value);
                    }
                }
                Ok(out)
            }
            ProjectMode::Exclude(fields) => {
                let mut out = doc.clone();
                if !self.include_id {
                    out.remove("_id");
                }
                for field in fields {
                    out.remove(field);
                }
                Ok(out)
            }
        }
    }
}

// ---------------------------------------------------------------- others

fn add_fields(fields: &Document, doc: Document) -> Result<Document> {
    let mut out = doc.clone();
    let scope = Scope::new(&doc);
    for (field, expr) in fields {
        match evaluate(expr, &scope)? {
            Some(value) => set_path(&mut out, field, value),
            None => {
                out.remove(field);
            }
        }
    }
    Ok(out)
}

fn parse_sort(spec: &Document) -> Result<Vec<(String, SortDirection)>> {
    if spec.is_empty() {
        return Err(stage_error("$sort needs at least one key"));
    }
    spec.iter()
        .map(|(field, direction)| {
            let direction = match as_i64(direction) {
                Some(1) => SortDirection::Ascending,
                Some(-1) => SortDirection::Descending,
                _ => {
                    return Err(stage_error(format!(
                        "$sort direction for {} must be 1 or -1",
                        field
                    )))
                }
            };
            Ok((field.clone(), direction))
        })
        .collect()
}

/// Stable multi-key sort.
fn sort(keys: &[(String, SortDirection)], mut docs: Vec<Document>) -> Vec<Document> {
    docs.sort_by(|a, b| {
        keys.iter()
            .map(|(field, direction)| {
                // missing and null sort as equals
                let ord = compare(
                    get_path(a, field).unwrap_or(&Bson::Null),
                    get_path(b, field).unwrap_or(&Bson::Null),
                );
                match direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    docs
}

fn parse_unwind(spec: &Bson) -> Result<String> {
    let path = match spec {
        Bson::Document(d) => d.get("path").and_then(field_reference),
        other => field_reference(other),
    };
    path.map(str::to_string)
        .ok_or_else(|| stage_error("$unwind needs a $-prefixed field path"))
}

/// One output document per array element. Missing, null and empty arrays
/// drop the document; a non-array value passes through unchanged.
fn unwind(path: &str, docs: Vec<Document>) -> Vec<Document> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match get_path(&doc, path).cloned() {
            Some(Bson::Array(items)) => {
                for item in items {
                    let mut copy = doc.clone();
                    set_path(&mut copy, path, item);
                    out.push(copy);
                }
            }
            None | Some(Bson::Null) | Some(Bson::Undefined) => {}
            Some(_) => out.push(doc),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn run(stage: Document, docs: Vec<Document>) -> Vec<Document> {
        Stage::parse(&stage).unwrap().execute(docs).unwrap()
    }

    #[test]
    fn group_sums_counts_and_keeps_first_seen_order() {
        let docs = vec![
            doc! {"k": "b", "v": 1},
            doc! {"k": "a", "v": 2.5},
            doc! {"k": "b", "v": 3},
        ];
        let out = run(
            doc! {"$group": {"_id": "$k", "n": {"$sum": 1}, "total": {"$sum": "$v"}}},
            docs,
        );
        assert_eq!(
            out,
            vec![
                doc! {"_id": "b", "n": 2, "total": 4},
                doc! {"_id": "a", "n": 1, "total": 2.5},
            ]
        );
    }

    #[test]
    fn sum_ignores_non_numeric() {
        let docs = vec![doc! {"v": true}, doc! {"v": "x"}, doc! {"v": 2}];
        let out = run(doc! {"$group": {"_id": null, "s": {"$sum": "$v"}}}, docs);
        assert_eq!(out[0].get("s"), Some(&Bson::Int32(2)));
    }

    #[test]
    fn avg_and_max() {
        let docs = vec![doc! {"d": 10}, doc! {"d": 20}, doc! {"d": 45}];
        let out = run(
            doc! {"$group": {"_id": null, "avg": {"$avg": "$d"}, "max": {"$max": "$d"}}},
            docs,
        );
        assert_eq!(out[0].get("avg"), Some(&Bson::Double(25.0)));
        assert_eq!(out[0].get("max"), Some(&Bson::Int32(45)));
    }

    #[test]
    fn project_include_and_compute() {
        let out = run(
            doc! {"$project": {"_id": 0, "x": 1, "y": "$nested.y", "gone": "$missing"}},
            vec![doc! {"_id": 7, "x": 1, "z": 2, "nested": {"y": 3}}],
        );
        assert_eq!(out, vec![doc! {"x": 1, "y": 3}]);
    }

    #[test]
    fn project_excluding_only_id_keeps_other_fields() {
        let out = run(
            doc! {"$project": {"_id": 0}},
            vec![doc! {"_id": 7, "x": 1, "nested": {"y": 3}}],
        );
        assert_eq!(out, vec![doc! {"x": 1, "nested": {"y": 3}}]);
    }

    #[test]
    fn project_mixing_modes_is_rejected() {
        assert!(Stage::parse(&doc! {"$project": {"a": 1, "b": 0}}).is_err());
    }

    #[test]
    fn unwind_arrays_and_drop_empty() {
        let out = run(
            doc! {"$unwind": "$xs"},
            vec![doc! {"xs": [1, 2]}, doc! {"xs": []}, doc! {"other": 1}],
        );
        assert_eq!(out, vec![doc! {"xs": 1}, doc! {"xs": 2}]);
    }

    #[test]
    fn sort_multiple_keys_with_missing_first() {
        let out = run(
            doc! {"$sort": {"a": 1, "b": -1}},
            vec![
                doc! {"a": 2, "b": 1},
                doc! {"a": 1, "b": 1},
                doc! {"a": 1, "b": 5},
                doc! {"b": 0},
            ],
        );
        assert_eq!(
            out,
            vec![
                doc! {"b": 0},
                doc! {"a": 1, "b": 5},
                doc! {"a": 1, "b": 1},
                doc! {"a": 2, "b": 1},
            ]
        );
    }

    #[test]
    fn sort_treats_missing_and_null_as_equal() {
        let out = run(
            doc! {"$sort": {"a": 1}},
            vec![
                doc! {"id": 1, "a": 2},
                doc! {"id": 2, "a": null},
                doc! {"id": 3},
                doc! {"id": 4, "a": null},
            ],
        );
        let ids: Vec<i32> = out.iter().map(|d| d.get_i32("id").unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 4, 1]);
    }

    #[test]
    fn group_merges_equal_numeric_keys() {
        let docs = vec![
            doc! {"k": 1, "v": 1},
            doc! {"k": 1.0, "v": 2},
            doc! {"k": 2_i64, "v": 4},
            doc! {"k": {"a": 1}, "v": 8},
            doc! {"k": {"a": 1.0}, "v": 16},
        ];
        let out = run(
            doc! {"$group": {"_id": "$k", "total": {"$sum": "$v"}}},
            docs,
        );
        assert_eq!(
            out,
            vec![
                doc! {"_id": 1, "total": 3},
                doc! {"_id": 2_i64, "total": 4},
                doc! {"_id": {"a": 1}, "total": 24},
            ]
        );
    }

    #[test]
    fn group_handles_many_records_and_groups() {
        const DESTS: [&str; 3] = ["SFO", "OAK", "SJC"];
        let docs: Vec<Document> = (0..60_000_usize)
            .map(|i| {
                let dest = DESTS[i % 3];
                let hr = (i % 240) as i32;
                doc! {"dest": dest, "hr": hr}
            })
            .collect();
        let out = run(
            doc! {"$group": {"_id": {"dest": "$dest", "hr": "$hr"}, "n": {"$sum": 1}}},
            docs,
        );
        assert_eq!(out.len(), 240);
        assert!(out.iter().all(|d| d.get_i32("n").unwrap() == 250));
        assert_eq!(out[0].get_document("_id").unwrap(), &doc! {"dest": "SFO", "hr": 0});
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let err = Stage::parse(&doc! {"$lookup": {}}).unwrap_err();
        assert!(err.to_string().contains("$lookup"));
    }
}
