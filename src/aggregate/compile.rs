use std::collections::BTreeMap;

use bson::{Bson, Document, doc};
use log::debug;

use crate::escape::{serialize_key, serialize_path};
use crate::query::{FilterContext, compile_expr, compile_filter, resolve_path};
use crate::types::{STORE_ID_FIELD, TOTAL_FIELD};

use super::types::{ExprNode, GroupKey, GroupValue, SearchField, SetValue, Stage};

const ACCUMULATORS: [(&str, &str); 7] = [
    ("first", "$first"),
    ("last", "$last"),
    ("sum", "$sum"),
    ("avg", "$avg"),
    ("max", "$max"),
    ("min", "$min"),
    ("push", "$push"),
];

/// Compiles an ordered stage list into a native pipeline.
///
/// Stages failing their own shape requirements are dropped; `None` means
/// the whole list compiled away and no aggregation is needed. At top level
/// the pipeline is finalized: unless the last sort occurs at or after the
/// last group, a deterministic ascending tie-break sort on the internal
/// identity field is appended, followed by a windowed total-count
/// annotation on [`TOTAL_FIELD`].
#[must_use]
pub fn compile_pipeline(
    stages: &[Stage],
    params: Option<&Document>,
    top_level: bool,
    alias_id: bool,
) -> Option<Vec<Document>> {
    let ctx = FilterContext { params, alias_id, ..FilterContext::default() };
    let mut pipeline = Vec::with_capacity(stages.len());
    let mut last_group = None;
    let mut last_sort = None;
    for stage in stages {
        let Some(compiled) = compile_stage(stage, &ctx) else {
            debug!("dropping aggregation stage: missing required fields");
            continue;
        };
        match stage {
            Stage::Group { .. } => last_group = Some(pipeline.len()),
            Stage::Sort { .. } => last_sort = Some(pipeline.len()),
            _ => {}
        }
        pipeline.push(compiled);
    }
    if pipeline.is_empty() {
        return None;
    }
    if top_level {
        let sort_dominates = match (last_sort, last_group) {
            (Some(sort), Some(group)) => sort >= group,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !sort_dominates {
            // Grouping without a trailing sort is unstable across pages.
            pipeline.push(doc! { "$sort": { STORE_ID_FIELD: 1 } });
        }
        pipeline.push(doc! { "$setWindowFields": { "output": { TOTAL_FIELD: { "$count": {} } } } });
    }
    Some(pipeline)
}

fn compile_stage(stage: &Stage, ctx: &FilterContext) -> Option<Document> {
    match stage {
        Stage::Sort { sort } => compile_sort(sort),
        Stage::Group { group_by, values } => compile_group(group_by, values, ctx),
        Stage::Query { query } => {
            if query.is_empty() {
                return None;
            }
            let filter = compile_filter(query, ctx);
            if filter.is_empty() { None } else { Some(doc! { "$match": filter }) }
        }
        Stage::Set { set } => compile_set(set, ctx),
        Stage::Reduce { input, initial_value, combine } => {
            let input = compile_expr_node(input.as_ref()?, ctx)?;
            let combine = compile_expr_node(combine.as_ref()?, ctx)?;
            Some(doc! { "$reduce": {
                "input": input,
                "initialValue": initial_value.clone()?,
                "in": combine,
            } })
        }
        Stage::If { cond, then, otherwise } => {
            let cond = compile_expr(cond, ctx)?;
            let then = compile_expr_node(then.as_ref()?, ctx)?;
            let otherwise = compile_expr_node(otherwise.as_ref()?, ctx)?;
            Some(doc! { "$cond": { "if": cond, "then": then, "else": otherwise } })
        }
        Stage::Limit { limit } => {
            let n = (*limit)?;
            if n > 0 { Some(doc! { "$limit": n }) } else { None }
        }
        Stage::Unwind { path } => {
            let path = path.as_deref().filter(|p| !p.is_empty())?;
            Some(doc! { "$unwind": {
                "path": format!("${}", resolve_path(path, ctx.alias_id)),
                "preserveNullAndEmptyArrays": false,
            } })
        }
        Stage::Root { new_root } => {
            let root = compile_expr_node(new_root.as_ref()?, ctx)?;
            Some(doc! { "$replaceRoot": { "newRoot": root } })
        }
        Stage::Lookup { from, local_field, foreign_field, bindings, stages, path } => {
            compile_lookup(
                from.as_deref(),
                local_field.as_deref(),
                foreign_field.as_deref(),
                bindings,
                stages,
                path.as_deref(),
                ctx,
            )
        }
        Stage::Project { fields } => compile_project(fields, ctx),
        Stage::ConcatArrays { arrays } => {
            let parts = compile_expr_list(arrays, ctx);
            if parts.is_empty() { None } else { Some(doc! { "$concatArrays": parts }) }
        }
        Stage::MergeObjects { objects } => {
            let parts = compile_expr_list(objects, ctx);
            if parts.is_empty() { None } else { Some(doc! { "$mergeObjects": parts }) }
        }
        Stage::Search { value, param, fields, fuzzy } => {
            compile_search(value.as_deref(), param.as_deref(), fields, *fuzzy, ctx)
        }
    }
}

fn compile_sort(sort: &Document) -> Option<Document> {
    if sort.is_empty() {
        return None;
    }
    let mut out = Document::new();
    for (field, direction) in sort {
        out.insert(serialize_path(field), direction.clone());
    }
    Some(doc! { "$sort": out })
}

fn compile_group(
    keys: &[GroupKey],
    values: &BTreeMap<String, GroupValue>,
    ctx: &FilterContext,
) -> Option<Document> {
    if keys.is_empty() && values.is_empty() {
        return None;
    }
    let mut id = Document::new();
    for key in keys {
        match key {
            GroupKey::Path(path) => {
                id.insert(
                    serialize_key(path.trim_start_matches('.')),
                    Bson::String(format!("${}", resolve_path(path, ctx.alias_id))),
                );
            }
            GroupKey::Computed { key, expr } => {
                let Some(compiled) = compile_expr_node(expr, ctx) else {
                    debug!("dropping group key {key:?}: expression compiled away");
                    continue;
                };
                id.insert(serialize_key(key), compiled);
            }
        }
    }
    let mut body = Document::new();
    body.insert(STORE_ID_FIELD, if id.is_empty() { Bson::Null } else { Bson::Document(id) });
    for (field, value) in values {
        let (op, source) = match value {
            GroupValue::Op(op) => (op.as_str(), Some(field.as_str())),
            GroupValue::Mapped { op, path } => (op.as_str(), path.as_deref()),
        };
        let Some(token) = accumulator_token(op) else {
            debug!("dropping group value {field:?}: unknown accumulator {op:?}");
            continue;
        };
        let source = match source {
            Some(path) => Bson::String(format!("${}", resolve_path(path, ctx.alias_id))),
            // No source path: accumulate the whole current row.
            None => Bson::String("$$ROOT".to_string()),
        };
        let mut acc = Document::new();
        acc.insert(token, source);
        body.insert(serialize_key(field), acc);
    }
    Some(doc! { "$group": body })
}

fn compile_set(set: &BTreeMap<String, SetValue>, ctx: &FilterContext) -> Option<Document> {
    if set.is_empty() {
        return None;
    }
    let mut body = Document::new();
    for (field, value) in set {
        let compiled = if let Some(literal) = &value.value {
            Some(literal.clone())
        } else if let Some(query) = &value.query {
            compile_expr(query, ctx)
        } else if let Some(stages) = &value.stages {
            compile_stage_exprs(stages, ctx)
        } else {
            None
        };
        let Some(compiled) = compiled else {
            debug!("dropping computed field {field:?}: no usable value");
            continue;
        };
        body.insert(serialize_key(field), compiled);
    }
    if body.is_empty() { None } else { Some(doc! { "$set": body }) }
}

fn compile_project(fields: &BTreeMap<String, ExprNode>, ctx: &FilterContext) -> Option<Document> {
    if fields.is_empty() {
        return None;
    }
    let mut body = Document::new();
    for (field, expr) in fields {
        let Some(compiled) = compile_expr_node(expr, ctx) else {
            debug!("dropping projected field {field:?}: expression compiled away");
            continue;
        };
        body.insert(serialize_key(field), compiled);
    }
    if body.is_empty() { None } else { Some(doc! { "$project": body }) }
}

#[allow(clippy::too_many_arguments)]
fn compile_lookup(
    from: Option<&str>,
    local_field: Option<&str>,
    foreign_field: Option<&str>,
    bindings: &BTreeMap<String, String>,
    stages: &[Stage],
    path: Option<&str>,
    ctx: &FilterContext,
) -> Option<Document> {
    let from = from?;
    let output = path.or(local_field)?;
    let mut body = doc! { "from": from };
    let joined = match (local_field, foreign_field) {
        (Some(local), Some(foreign)) => {
            body.insert("localField", resolve_path(local, ctx.alias_id));
            body.insert("foreignField", resolve_path(foreign, ctx.alias_id));
            true
        }
        _ => false,
    };
    let mut correlated = false;
    if !stages.is_empty()
        && let Some(pipeline) = compile_pipeline(stages, ctx.params, false, ctx.alias_id)
    {
        if !bindings.is_empty() {
            let mut vars = Document::new();
            for (name, path) in bindings {
                vars.insert(name, format!("${}", resolve_path(path, ctx.alias_id)));
            }
            body.insert("let", vars);
        }
        body.insert("pipeline", pipeline);
        correlated = true;
    }
    if !joined && !correlated {
        return None;
    }
    body.insert("as", serialize_path(output.trim_start_matches('.')));
    Some(doc! { "$lookup": body })
}

fn compile_search(
    value: Option<&str>,
    param: Option<&str>,
    fields: &[SearchField],
    fuzzy: bool,
    ctx: &FilterContext,
) -> Option<Document> {
    let query = match value {
        Some(text) => text.to_string(),
        None => {
            let name = param?;
            ctx.params?.get_str(name).ok()?.to_string()
        }
    };
    if fields.is_empty() {
        return None;
    }
    let clause = |field: &SearchField| {
        let mut body = doc! {
            "query": query.clone(),
            "path": serialize_path(field.path()),
        };
        if fuzzy {
            body.insert("fuzzy", Document::new());
        }
        if let Some(boost) = field.boost() {
            body.insert("score", doc! { "boost": { "value": boost } });
        }
        doc! { "autocomplete": body }
    };
    if let [only] = fields {
        return Some(doc! { "$search": clause(only) });
    }
    let should: Vec<Bson> = fields.iter().map(|f| Bson::Document(clause(f))).collect();
    Some(doc! { "$search": {
        "compound": { "should": should, "minimumShouldMatch": 1 },
    } })
}

fn compile_expr_node(node: &ExprNode, ctx: &FilterContext) -> Option<Bson> {
    match node {
        ExprNode::Stage(stage) => compile_stage(stage, ctx).map(Bson::Document),
        ExprNode::Value { value } => Some(value.clone()),
        ExprNode::Path(path) => {
            Some(Bson::String(format!("${}", resolve_path(path, ctx.alias_id))))
        }
        ExprNode::Literal(value) => Some(value.clone()),
    }
}

fn compile_expr_list(nodes: &[ExprNode], ctx: &FilterContext) -> Vec<Bson> {
    nodes.iter().filter_map(|n| compile_expr_node(n, ctx)).collect()
}

/// A nested sub-pipeline used as a computed value: one surviving stage is
/// used directly as the expression, several become an array.
fn compile_stage_exprs(stages: &[Stage], ctx: &FilterContext) -> Option<Bson> {
    let mut compiled: Vec<Bson> =
        stages.iter().filter_map(|s| compile_stage(s, ctx).map(Bson::Document)).collect();
    match compiled.len() {
        0 => None,
        1 => compiled.pop(),
        _ => Some(Bson::Array(compiled)),
    }
}

fn accumulator_token(op: &str) -> Option<&'static str> {
    ACCUMULATORS.iter().find(|(name, _)| *name == op).map(|(_, token)| *token)
}
