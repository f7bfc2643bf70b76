use bson::{Bson, doc};
use docplan::cursor::{decode, encode};
use docplan::types::{Order, SortSpec};
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_string_anchor_round_trips(id in "\\PC{1,24}") {
        let last = doc! { "id": id.clone() };
        let token = encode(&last, None, None).unwrap();
        let parsed = decode(Some(&token)).unwrap();
        prop_assert_eq!(parsed.id, Bson::String(id.clone()));
        prop_assert_eq!(parsed.filter[0].value.clone(), Some(Bson::String(id)));
        prop_assert_eq!(parsed.filter[0].op.as_deref(), Some("gte"));
    }

    #[test]
    fn prop_integer_sort_boundary_round_trips(id in any::<i32>(), age in any::<i32>(), desc in any::<bool>()) {
        let order = if desc { Order::Desc } else { Order::Asc };
        let sort = vec![SortSpec::new("age", order)];
        let last = doc! { "id": id, "age": age };
        let token = encode(&last, Some(&sort), None).unwrap();
        let parsed = decode(Some(&token)).unwrap();
        prop_assert_eq!(parsed.id, Bson::Int32(id));
        let expected_op = if desc { "lte" } else { "gte" };
        prop_assert_eq!(parsed.filter[0].op.as_deref(), Some(expected_op));
        prop_assert_eq!(parsed.filter[0].value.clone(), Some(Bson::Int32(age)));
    }

    #[test]
    fn prop_tokens_stay_unpadded(id in "\\PC{1,24}", field in "[a-z]{1,8}", text in "\\PC{0,24}") {
        let sort = vec![SortSpec::new(field.clone(), Order::Asc)];
        let mut last = doc! { "id": id };
        last.insert(field, text);
        let token = encode(&last, Some(&sort), None).unwrap();
        prop_assert!(!token.contains('='));
        prop_assert!(decode(Some(&token)).is_some());
    }
}
