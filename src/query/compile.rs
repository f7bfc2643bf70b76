use bson::{Bson, Document, doc};
use log::debug;

use crate::escape::{parse_iso_date, serialize_path};
use crate::types::{ID_FIELD, STORE_ID_FIELD};

use super::types::{FilterContext, QueryNode, QueryObject, QueryOp};

/// Compiles query nodes into a native filter document.
///
/// `nodes` carries the static/config query followed by the request query;
/// the decoded cursor range from the context is appended last. Same-path
/// predicates from different sources overwrite each other, last source
/// wins; this is the documented merge behavior, not an intersection.
#[must_use]
pub fn compile_filter(nodes: &[QueryNode], ctx: &FilterContext) -> Document {
    let mut filter = Document::new();
    for node in nodes {
        compile_node(node, &mut filter, ctx);
    }
    if let Some(cursor) = ctx.cursor {
        for predicate in &cursor.filter {
            compile_leaf(predicate, &mut filter, ctx);
        }
    }
    if nodes.is_empty()
        && let Some(id) = ctx.target_id
        && !ctx.append_only
    {
        let field = if ctx.alias_id { STORE_ID_FIELD } else { ID_FIELD };
        filter.insert(field, id.clone());
    }
    cast_dates(&mut filter);
    filter
}

/// Compiles query nodes into a bare boolean expression for use inside
/// pipeline expression context (`$cond`, computed `$set` values, ...).
/// Multiple nodes combine with `$and`; returns `None` when every node was
/// dropped.
#[must_use]
pub fn compile_expr(nodes: &[QueryNode], ctx: &FilterContext) -> Option<Bson> {
    let mut parts: Vec<Bson> = nodes.iter().filter_map(|n| node_expr(n, ctx)).collect();
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(Bson::Document(doc! { "$and": parts })),
    }
}

/// Escapes a field path, applying identity aliasing unless the path carries
/// the leading-dot bypass marker.
#[must_use]
pub(crate) fn resolve_path(path: &str, alias_id: bool) -> String {
    if let Some(bare) = path.strip_prefix('.') {
        return serialize_path(bare);
    }
    if alias_id && path == ID_FIELD {
        return STORE_ID_FIELD.to_string();
    }
    serialize_path(path)
}

fn compile_node(node: &QueryNode, filter: &mut Document, ctx: &FilterContext) {
    match node {
        QueryNode::Leaf(qo) => compile_leaf(qo, filter, ctx),
        QueryNode::Any(branches) => {
            let mut or = Vec::new();
            for branch in branches {
                let mut doc = Document::new();
                compile_branch(branch, &mut doc, ctx);
                if !doc.is_empty() {
                    or.push(Bson::Document(doc));
                }
            }
            if !or.is_empty() {
                filter.insert("$or", or);
            }
        }
    }
}

fn compile_branch(node: &QueryNode, branch: &mut Document, ctx: &FilterContext) {
    match node {
        QueryNode::Leaf(qo) => compile_leaf(qo, branch, ctx),
        // An array inside a disjunction branch is a conjunction; anything
        // nested deeper recurses back through the disjunction rule.
        QueryNode::Any(items) => {
            for item in items {
                compile_node(item, branch, ctx);
            }
        }
    }
}

fn compile_leaf(qo: &QueryObject, filter: &mut Document, ctx: &FilterContext) {
    let Some(op) = qo.op.as_deref().map_or(Some(QueryOp::Eq), QueryOp::parse) else {
        debug!("dropping predicate on {:?}: unknown operator {:?}", qo.path, qo.op);
        return;
    };
    let path = resolve_path(&qo.path, ctx.alias_id);

    if op == QueryOp::IsArray || qo.expr {
        if let Some(expr) = leaf_expr(qo, op, &path, ctx) {
            filter.insert("$expr", expr);
        }
        return;
    }

    let Some(value) = resolve_operand(qo, op, ctx) else {
        debug!("dropping predicate on {:?}: unresolved operand", qo.path);
        return;
    };
    if !value_allowed(op, &value) {
        debug!("dropping predicate on {:?}: value outside whitelist", qo.path);
        return;
    }

    match op {
        QueryOp::Search => {
            filter.insert("$text", doc! { "$search": value });
        }
        QueryOp::Eq => {
            filter.insert(path, value);
        }
        QueryOp::IsSet => {
            filter.insert(path, doc! { "$ne": Bson::Null });
        }
        QueryOp::NotSet => {
            filter.insert(path, Bson::Null);
        }
        QueryOp::Match => {
            filter.insert(path, doc! { "$elemMatch": value });
        }
        other => {
            // Total for the remaining whitelist.
            if let Some(token) = other.token() {
                let mut cond = Document::new();
                cond.insert(token, value);
                filter.insert(path, cond);
            }
        }
    }
}

/// Compiles one predicate into expression form, `{$op: ["$path", value]}`.
fn leaf_expr(qo: &QueryObject, op: QueryOp, path: &str, ctx: &FilterContext) -> Option<Bson> {
    if op == QueryOp::IsArray {
        return Some(Bson::Document(doc! { "$isArray": format!("${path}") }));
    }
    let value = resolve_operand(qo, op, ctx)?;
    if !value_allowed(op, &value) {
        debug!("dropping expression predicate on {:?}: value outside whitelist", qo.path);
        return None;
    }
    let Some(token) = op.expr_token() else {
        debug!("dropping expression predicate on {:?}: operator has no expression form", qo.path);
        return None;
    };
    let mut expr = Document::new();
    expr.insert(token, vec![Bson::String(format!("${path}")), value]);
    Some(Bson::Document(expr))
}

fn node_expr(node: &QueryNode, ctx: &FilterContext) -> Option<Bson> {
    match node {
        QueryNode::Leaf(qo) => {
            let op = qo.op.as_deref().map_or(Some(QueryOp::Eq), QueryOp::parse)?;
            let path = resolve_path(&qo.path, ctx.alias_id);
            leaf_expr(qo, op, &path, ctx)
        }
        QueryNode::Any(branches) => {
            let exprs: Vec<Bson> = branches
                .iter()
                .filter_map(|branch| match branch {
                    QueryNode::Leaf(_) => node_expr(branch, ctx),
                    QueryNode::Any(items) => compile_expr(items, ctx),
                })
                .collect();
            if exprs.is_empty() { None } else { Some(Bson::Document(doc! { "$or": exprs })) }
        }
    }
}

fn resolve_operand(qo: &QueryObject, op: QueryOp, ctx: &FilterContext) -> Option<Bson> {
    if matches!(op, QueryOp::IsSet | QueryOp::NotSet) {
        return Some(Bson::Null);
    }
    if let Some(name) = &qo.variable {
        return Some(Bson::String(format!("$${name}")));
    }
    if let Some(name) = &qo.param {
        return ctx.params.and_then(|p| p.get(name)).cloned();
    }
    qo.value.clone()
}

fn value_allowed(op: QueryOp, value: &Bson) -> bool {
    match op {
        QueryOp::IsSet | QueryOp::NotSet => matches!(value, Bson::Null),
        QueryOp::Match => matches!(value, Bson::Document(_)),
        QueryOp::IsArray => true,
        _ => match value {
            Bson::Array(items) => items.iter().all(scalar_allowed),
            other => scalar_allowed(other),
        },
    }
}

fn scalar_allowed(value: &Bson) -> bool {
    matches!(
        value,
        Bson::String(_)
            | Bson::Int32(_)
            | Bson::Int64(_)
            | Bson::Double(_)
            | Bson::Boolean(_)
            | Bson::DateTime(_)
    )
}

/// Casts ISO-8601-looking string values to native dates, recursing into
/// nested predicate documents but leaving arrays and existing dates alone.
fn cast_dates(filter: &mut Document) {
    for (_, value) in filter.iter_mut() {
        if let Bson::Document(nested) = value {
            cast_dates(nested);
            continue;
        }
        let parsed = match value {
            Bson::String(s) => parse_iso_date(s),
            _ => None,
        };
        if let Some(dt) = parsed {
            *value = Bson::DateTime(dt);
        }
    }
}
