use bson::{Bson, doc};
use docplan::cursor::ParsedPageCursor;
use docplan::query::{FilterContext, QueryNode, QueryObject, compile_expr, compile_filter, parse_query_json};

fn leaf(qo: QueryObject) -> QueryNode {
    QueryNode::Leaf(qo)
}

#[test]
fn comparison_compiles_to_native_token() {
    let nodes = vec![leaf(QueryObject::cmp("meta.views", "gt", 300))];
    let filter = compile_filter(&nodes, &FilterContext::default());
    assert_eq!(filter, doc! { "meta.views": { "$gt": 300 } });
}

#[test]
fn every_whitelisted_comparison_maps() {
    for (op, token) in
        [("ne", "$ne"), ("lt", "$lt"), ("gt", "$gt"), ("lte", "$lte"), ("gte", "$gte")]
    {
        let nodes = vec![leaf(QueryObject::cmp("n", op, 5))];
        let filter = compile_filter(&nodes, &FilterContext::default());
        let mut cond = bson::Document::new();
        cond.insert(token, 5);
        assert_eq!(filter, doc! { "n": cond }, "operator {op}");
    }
}

#[test]
fn regex_compiles_to_native_token() {
    let nodes = vec![leaf(QueryObject::cmp("name", "regex", "^al"))];
    let filter = compile_filter(&nodes, &FilterContext::default());
    assert_eq!(filter, doc! { "name": { "$regex": "^al" } });
}

#[test]
fn eq_emits_bare_value() {
    let nodes = vec![leaf(QueryObject::cmp("name", "eq", "alice"))];
    let filter = compile_filter(&nodes, &FilterContext::default());
    assert_eq!(filter, doc! { "name": "alice" });

    // Missing operator defaults to equality.
    let nodes = vec![leaf(QueryObject {
        path: "name".into(),
        value: Some(Bson::String("bob".into())),
        ..QueryObject::default()
    })];
    let filter = compile_filter(&nodes, &FilterContext::default());
    assert_eq!(filter, doc! { "name": "bob" });
}

#[test]
fn in_and_nin_take_scalar_arrays() {
    let values = Bson::Array(vec![Bson::Int32(1), Bson::Int32(2)]);
    let nodes = vec![leaf(QueryObject::cmp("n", "in", values.clone()))];
    let filter = compile_filter(&nodes, &FilterContext::default());
    assert_eq!(filter, doc! { "n": { "$in": [1, 2] } });

    let nodes = vec![leaf(QueryObject::cmp("n", "nin", values))];
    let filter = compile_filter(&nodes, &FilterContext::default());
    assert_eq!(filter, doc! { "n": { "$nin": [1, 2] } });
}

#[test]
fn isset_and_notset_compile_to_null_forms() {
    let nodes = vec![
        leaf(QueryObject { path: "a".into(), op: Some("isset".into()), ..QueryObject::default() }),
        leaf(QueryObject { path: "b".into(), op: Some("notset".into()), ..QueryObject::default() }),
    ];
    let filter = compile_filter(&nodes, &FilterContext::default());
    assert_eq!(filter, doc! { "a": { "$ne": Bson::Null }, "b": Bson::Null });
}

#[test]
fn match_compiles_to_element_match() {
    let nodes = vec![leaf(QueryObject::cmp("items", "match", doc! { "qty": { "$gt": 1 } }))];
    let filter = compile_filter(&nodes, &FilterContext::default());
    assert_eq!(filter, doc! { "items": { "$elemMatch": { "qty": { "$gt": 1 } } } });
}

#[test]
fn search_lands_at_text_key() {
    let nodes = vec![leaf(QueryObject::cmp("", "search", "wind"))];
    let filter = compile_filter(&nodes, &FilterContext::default());
    assert_eq!(filter, doc! { "$text": { "$search": "wind" } });
}

#[test]
fn is_array_and_expr_land_at_expr_key() {
    let nodes = vec![leaf(QueryObject {
        path: "tags".into(),
        op: Some("isArray".into()),
        ..QueryObject::default()
    })];
    let filter = compile_filter(&nodes, &FilterContext::default());
    assert_eq!(filter, doc! { "$expr": { "$isArray": "$tags" } });

    let mut qo = QueryObject::cmp("price", "gt", 10);
    qo.expr = true;
    let filter = compile_filter(&[leaf(qo)], &FilterContext::default());
    assert_eq!(filter, doc! { "$expr": { "$gt": ["$price", 10] } });
}

#[test]
fn unknown_operator_and_bad_values_drop_silently() {
    let nodes = vec![
        leaf(QueryObject::cmp("a", "like", "x")),
        leaf(QueryObject::cmp("b", "eq", doc! { "not": "a scalar" })),
        leaf(QueryObject::cmp("c", "in", Bson::Array(vec![Bson::Document(doc! {})]))),
    ];
    let filter = compile_filter(&nodes, &FilterContext::default());
    assert!(filter.is_empty());
}

#[test]
fn param_resolves_through_ambient_map_and_missing_param_drops() {
    let params = doc! { "minAge": 21 };
    let ctx = FilterContext::with_params(&params);
    let nodes = vec![leaf(QueryObject {
        path: "age".into(),
        op: Some("gte".into()),
        param: Some("minAge".into()),
        ..QueryObject::default()
    })];
    assert_eq!(compile_filter(&nodes, &ctx), doc! { "age": { "$gte": 21 } });

    let nodes = vec![leaf(QueryObject {
        path: "age".into(),
        op: Some("gte".into()),
        param: Some("unknown".into()),
        ..QueryObject::default()
    })];
    assert!(compile_filter(&nodes, &ctx).is_empty());
}

#[test]
fn variable_becomes_pipeline_placeholder() {
    let nodes = vec![leaf(QueryObject {
        path: "owner".into(),
        variable: Some("userId".into()),
        ..QueryObject::default()
    })];
    let filter = compile_filter(&nodes, &FilterContext::default());
    assert_eq!(filter, doc! { "owner": "$$userId" });
}

#[test]
fn nested_arrays_compile_to_disjunction() {
    let nodes = vec![QueryNode::Any(vec![
        leaf(QueryObject::cmp("status", "eq", "open")),
        // A nested array within an OR-group is a conjunction.
        QueryNode::Any(vec![
            leaf(QueryObject::cmp("status", "eq", "closed")),
            leaf(QueryObject::cmp("priority", "gt", 3)),
        ]),
    ])];
    let filter = compile_filter(&nodes, &FilterContext::default());
    assert_eq!(
        filter,
        doc! { "$or": [
            { "status": "open" },
            { "status": "closed", "priority": { "$gt": 3 } },
        ] }
    );
}

#[test]
fn iso_strings_cast_to_native_dates() {
    let nodes = vec![leaf(QueryObject::cmp("since", "gte", "2024-05-06T07:08:09Z"))];
    let filter = compile_filter(&nodes, &FilterContext::default());
    let cond = filter.get_document("since").unwrap();
    assert!(matches!(cond.get("$gte"), Some(Bson::DateTime(_))));

    // Plain strings and near-misses stay strings.
    let nodes = vec![leaf(QueryObject::cmp("name", "eq", "2024-05-06"))];
    let filter = compile_filter(&nodes, &FilterContext::default());
    assert_eq!(filter, doc! { "name": "2024-05-06" });
}

#[test]
fn identity_injection_for_single_item_requests() {
    let id = Bson::String("ent1".into());
    let ctx = FilterContext { target_id: Some(&id), ..FilterContext::default() };
    assert_eq!(compile_filter(&[], &ctx), doc! { "id": "ent1" });

    let ctx = FilterContext { target_id: Some(&id), alias_id: true, ..FilterContext::default() };
    assert_eq!(compile_filter(&[], &ctx), doc! { "_id": "ent1" });

    // Append-only mode suppresses the lookup so a new record is created.
    let ctx = FilterContext { target_id: Some(&id), append_only: true, ..FilterContext::default() };
    assert!(compile_filter(&[], &ctx).is_empty());
}

#[test]
fn identity_aliasing_rewrites_paths_and_leading_dot_bypasses() {
    let ctx = FilterContext { alias_id: true, ..FilterContext::default() };
    let nodes = vec![leaf(QueryObject::cmp("id", "eq", "e1"))];
    assert_eq!(compile_filter(&nodes, &ctx), doc! { "_id": "e1" });

    let nodes = vec![leaf(QueryObject::cmp(".id", "eq", "e1"))];
    assert_eq!(compile_filter(&nodes, &ctx), doc! { "id": "e1" });
}

#[test]
fn cursor_range_is_merged_last_and_same_path_overwrites() {
    let cursor = ParsedPageCursor {
        id: Bson::String("ent2".into()),
        filter: vec![QueryObject::cmp("id", "gte", "ent2")],
        is_agg: false,
    };
    let ctx = FilterContext { cursor: Some(&cursor), ..FilterContext::default() };
    let nodes = vec![leaf(QueryObject::cmp("status", "eq", "open"))];
    let filter = compile_filter(&nodes, &ctx);
    assert_eq!(filter, doc! { "status": "open", "id": { "$gte": "ent2" } });

    // Same-path merge is a plain overwrite; the last source wins.
    let nodes = vec![leaf(QueryObject::cmp("id", "gt", "aaa"))];
    let filter = compile_filter(&nodes, &ctx);
    assert_eq!(filter, doc! { "id": { "$gte": "ent2" } });
}

#[test]
fn compile_expr_combines_with_and_or() {
    let nodes = vec![
        leaf(QueryObject::cmp("price", "gt", 10)),
        leaf(QueryObject::cmp("price", "lt", 100)),
    ];
    let expr = compile_expr(&nodes, &FilterContext::default()).unwrap();
    assert_eq!(
        expr,
        Bson::Document(doc! { "$and": [
            { "$gt": ["$price", 10] },
            { "$lt": ["$price", 100] },
        ] })
    );

    let nodes = vec![QueryNode::Any(vec![
        leaf(QueryObject::cmp("a", "eq", 1)),
        leaf(QueryObject::cmp("b", "eq", 2)),
    ])];
    let expr = compile_expr(&nodes, &FilterContext::default()).unwrap();
    assert_eq!(
        expr,
        Bson::Document(doc! { "$or": [
            { "$eq": ["$a", 1] },
            { "$eq": ["$b", 2] },
        ] })
    );
}

#[test]
fn descriptors_parse_from_json() {
    let nodes = parse_query_json(r#"[{"path": "meta.views", "op": "gt", "value": 300}]"#).unwrap();
    let filter = compile_filter(&nodes, &FilterContext::default());
    let views = filter.get_document("meta.views").unwrap();
    let gt = views.get("$gt").unwrap();
    assert_eq!(gt.as_i64().or_else(|| gt.as_i32().map(i64::from)), Some(300));

    // A nested array parses as a disjunction node.
    let nodes = parse_query_json(
        r#"[[{"path": "a", "value": 1}, {"path": "b", "value": 2}]]"#,
    )
    .unwrap();
    assert!(matches!(nodes[0], QueryNode::Any(_)));

    assert!(parse_query_json("not json").is_err());
}
