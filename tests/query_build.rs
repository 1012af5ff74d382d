//! Query-builder behavior through the public API: wire shapes, variable
//! hygiene and pseudo-type handling.

use photondb_client::reql::json;
use photondb_client::{r, Datum};

fn wire(query: &photondb_client::Query) -> String {
    json::write(query.get_datum())
}

#[test]
fn chained_query_serializes_to_nested_term_arrays() {
    let query = r::db("blog").table("posts").filter(r::row().bracket("draft").eq(false)).limit(10);
    let serialized = wire(&query);
    assert!(serialized.starts_with("[71,[[39,[[15,[[14,[\"blog\"]],\"posts\"]],"), "{serialized}");
    assert!(serialized.ends_with(",10]]"), "{serialized}");
}

#[test]
fn array_literals_stay_distinct_from_term_arrays() {
    // a literal [1,2,3] must not be confused with a [code, args] term
    let query = r::expr(vec![1, 2, 3]);
    assert_eq!(wire(&query), "[2,[1,2,3]]");

    let parsed = json::parse(&wire(&query)).unwrap();
    assert_eq!(
        parsed.get_nth(0).and_then(Datum::get_number),
        Some(2.0) // MAKE_ARRAY
    );
}

#[test]
fn nested_functions_keep_distinct_variables() {
    let query = r::range(10).map(r::func1(|x| {
        r::range(3)
            .map(r::func1(move |y| r::expr(x.clone()) + y))
            .count()
    }));
    assert_eq!(query.free_var_count(), 0);

    // two FUNC terms, two distinct VAR ids
    let serialized = wire(&query);
    let funcs = serialized.matches("[69,[[2,[").count();
    assert_eq!(funcs, 2, "{serialized}");
}

#[test]
fn implicit_row_wraps_only_where_needed() {
    let wrapped = r::table("t").filter(r::row().bracket("x").gt(1));
    assert!(wire(&wrapped).contains("[69,["));

    let unwrapped = r::table("t").get_all(vec![1, 2]);
    assert!(!wire(&unwrapped).contains("[69,["));
}

#[test]
fn object_and_binary_constructors() {
    let object = r::object(vec![r::expr("name"), r::expr("ada")]);
    assert_eq!(wire(&object), "{\"name\":\"ada\"}");

    let binary = r::binary("ada");
    let serialized = wire(&binary);
    assert!(serialized.contains("\"$reql_type$\":\"BINARY\""), "{serialized}");
}

#[test]
fn opt_attaches_named_options() {
    let query = r::table("users")
        .between(1, 10)
        .opt(photondb_client::OptArgs::new().with("index", "age"))
        .unwrap();
    assert_eq!(
        wire(&query),
        "[182,[[15,[\"users\"]],1,10],{\"index\":\"age\"}]"
    );
}

#[test]
fn datum_comparison_follows_type_rank() {
    let values = [
        Datum::Null,
        Datum::Bool(true),
        Datum::Number(10.0),
        Datum::String("z".into()),
        Datum::Binary(vec![1]),
        Datum::Array(vec![Datum::Number(1.0)]),
    ];
    for window in values.windows(2) {
        assert_eq!(window[0].compare(&window[1]), std::cmp::Ordering::Less);
    }
}
