//! Query construction: term trees, variable binding and serialization.
//!
//! A [`Query`] pairs a term tree (stored as a [`Datum`]) with a map of free
//! variables. Composite terms serialize as `[type_code, [args], {optargs}]`
//! arrays; literal arrays inside a query are lifted to MAKE_ARRAY terms so
//! the two encodings can never be confused.
//!
//! Free-variable bookkeeping drives alpha-renaming: every binder occurrence
//! gets an identity handle (an `Arc` allocation), and when a sub-query is
//! grafted into a parent, variables that share an id but not a binder are
//! renamed to fresh ids throughout the grafted term tree. Two references to
//! the same binder coalesce; two distinct binders never collide.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::net::connection::Connection;
use crate::net::cursor::Cursor;
use crate::reql::datum::Datum;
use crate::reql::terms::TermType;

/// Identity handle for one binder occurrence. The allocation itself is the
/// identity; the pointee is the generated variable id.
pub(crate) type Binder = Arc<u32>;

static NEXT_VAR_ID: AtomicU32 = AtomicU32::new(1);

/// Generate a 30-bit variable id from the process-wide counter.
pub(crate) fn gen_var_id() -> u32 {
    NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed) & ((1 << 30) - 1)
}

fn fresh_var_id(taken: &HashMap<u32, Binder>) -> u32 {
    loop {
        let id = gen_var_id();
        if !taken.contains_key(&id) {
            return id;
        }
    }
}

/// A query under construction: a term tree plus its free variables.
#[derive(Debug, Clone)]
pub struct Query {
    pub(crate) term: Datum,
    pub(crate) free_vars: HashMap<u32, Binder>,
}

/// A variable introduced by a function term, handed to the closures passed
/// to [`func1`]/[`func2`]. Convert it into a [`Query`] (or pass it to any
/// argument position accepting `impl Into<Query>`) to reference it.
#[derive(Debug, Clone)]
pub struct Var {
    binder: Binder,
}

impl Var {
    fn fresh() -> Var {
        Var {
            binder: Arc::new(gen_var_id()),
        }
    }

    /// The generated variable id.
    pub fn id(&self) -> u32 {
        *self.binder
    }
}

impl From<Var> for Query {
    fn from(var: Var) -> Self {
        let id = var.id();
        let term = Datum::Array(vec![
            term_code(TermType::Var),
            Datum::Array(vec![Datum::Number(id as f64)]),
        ]);
        let mut free_vars = HashMap::new();
        free_vars.insert(id, var.binder);
        Query { term, free_vars }
    }
}

fn term_code(term_type: TermType) -> Datum {
    Datum::Number(term_type.code() as f64)
}

/// Lift a literal datum into term form: arrays become MAKE_ARRAY terms,
/// objects recurse per value, everything else is already a valid term.
fn datum_to_term(datum: Datum) -> Datum {
    match datum {
        Datum::Array(items) => Datum::Array(vec![
            term_code(TermType::MakeArray),
            Datum::Array(items.into_iter().map(datum_to_term).collect()),
        ]),
        Datum::Object(map) => {
            Datum::Object(map.into_iter().map(|(k, v)| (k, datum_to_term(v))).collect())
        }
        other => other,
    }
}

/// Rewrite `[VAR, [id]]` leaves according to `subst`. `in_args` tracks
/// whether the current array is an argument list (a plain sequence of terms)
/// or a `[code, args, optargs?]` term encoding.
fn substitute(datum: Datum, subst: &HashMap<u32, u32>, in_args: bool) -> Datum {
    match datum {
        Datum::Object(map) => Datum::Object(
            map.into_iter()
                .map(|(k, v)| (k, substitute(v, subst, false)))
                .collect(),
        ),
        Datum::Array(mut items) => {
            if in_args {
                return Datum::Array(
                    items
                        .into_iter()
                        .map(|item| substitute(item, subst, false))
                        .collect(),
                );
            }
            let code = items.first().and_then(Datum::get_number);
            if code == Some(TermType::Var.code() as f64) {
                let id = items
                    .get(1)
                    .and_then(|args| args.get_nth(0))
                    .and_then(Datum::get_number);
                if let Some(fresh) = id.and_then(|id| subst.get(&(id as u32))) {
                    return Datum::Array(vec![
                        term_code(TermType::Var),
                        Datum::Array(vec![Datum::Number(*fresh as f64)]),
                    ]);
                }
            }
            if items.len() >= 2 {
                let args = std::mem::replace(&mut items[1], Datum::Null);
                items[1] = substitute(args, subst, true);
            }
            if items.len() >= 3 {
                let optargs = std::mem::replace(&mut items[2], Datum::Null);
                items[2] = substitute(optargs, subst, false);
            }
            Datum::Array(items)
        }
        other => other,
    }
}

impl Query {
    pub(crate) fn from_datum(datum: Datum) -> Query {
        Query {
            term: datum_to_term(datum),
            free_vars: HashMap::new(),
        }
    }

    /// Build a composite term, merging each argument's free variables.
    pub(crate) fn new(term_type: TermType, args: Vec<Query>, optargs: Option<OptArgs>) -> Query {
        let mut query = Query {
            term: Datum::Null,
            free_vars: HashMap::new(),
        };
        let mut dargs = Vec::with_capacity(args.len());
        for arg in args {
            dargs.push(query.alpha_rename(arg));
        }
        let mut parts = vec![term_code(term_type), Datum::Array(dargs)];
        if let Some(optargs) = optargs {
            if !optargs.0.is_empty() {
                let mut object = BTreeMap::new();
                for (key, value) in optargs.0 {
                    let datum = query.alpha_rename(value);
                    object.insert(key, datum);
                }
                parts.push(Datum::Object(object));
            }
        }
        query.term = Datum::Array(parts);
        query
    }

    /// Merge a child query into this one, renaming the child's free
    /// variables wherever an id is already taken by a different binder.
    /// Returns the (possibly rewritten) child term.
    pub(crate) fn alpha_rename(&mut self, child: Query) -> Datum {
        if self.free_vars.is_empty() {
            self.free_vars = child.free_vars;
            return child.term;
        }
        let mut subst: HashMap<u32, u32> = HashMap::new();
        for (id, binder) in child.free_vars {
            match self.free_vars.get(&id) {
                None => {
                    self.free_vars.insert(id, binder);
                }
                Some(existing) if Arc::ptr_eq(existing, &binder) => {}
                Some(_) => {
                    let fresh = fresh_var_id(&self.free_vars);
                    subst.insert(id, fresh);
                    self.free_vars.insert(fresh, binder);
                }
            }
        }
        if subst.is_empty() {
            child.term
        } else {
            substitute(child.term, &subst, false)
        }
    }

    /// The term tree in its wire datum form.
    pub fn get_datum(&self) -> &Datum {
        &self.term
    }

    /// How many free variables the query still carries. Non-zero means the
    /// query cannot run.
    pub fn free_var_count(&self) -> usize {
        self.free_vars.len()
    }

    /// Graft named options onto an already built composite term. Options
    /// with a name the term already carries overwrite the old value.
    pub fn opt(self, optargs: OptArgs) -> Result<Query> {
        let mut items = match self.term {
            Datum::Array(items) if items.len() >= 2 => items,
            other => {
                return Err(Error::Driver(format!(
                    "opt: term {} cannot carry options",
                    crate::reql::json::write(&other)
                )))
            }
        };
        let mut object = if items.len() >= 3 {
            match std::mem::replace(&mut items[2], Datum::Null) {
                Datum::Object(object) => object,
                other => {
                    return Err(Error::Driver(format!(
                        "opt: malformed optargs {}",
                        crate::reql::json::write(&other)
                    )))
                }
            }
        } else {
            BTreeMap::new()
        };
        let mut query = Query {
            term: Datum::Null,
            free_vars: self.free_vars,
        };
        for (key, value) in optargs.0 {
            let datum = query.alpha_rename(value);
            object.insert(key, datum);
        }
        items.truncate(2);
        items.push(Datum::Object(object));
        query.term = Datum::Array(items);
        Ok(query)
    }

    /// Build an object literal when the arguments are distinct string-keyed
    /// pairs; fall back to a server-side OBJECT term otherwise.
    pub(crate) fn make_object(args: Vec<Query>) -> Query {
        if args.len() % 2 != 0 {
            return Query::new(TermType::Object, args, None);
        }
        let mut keys = HashSet::new();
        for pair in args.chunks(2) {
            match pair[0].term.get_string() {
                Some(key) if keys.insert(key.to_string()) => {}
                _ => return Query::new(TermType::Object, args, None),
            }
        }
        let mut query = Query {
            term: Datum::Null,
            free_vars: HashMap::new(),
        };
        let mut object = BTreeMap::new();
        let mut iter = args.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            if let Datum::String(key) = key.term {
                let datum = query.alpha_rename(value);
                object.insert(key, datum);
            }
        }
        query.term = Datum::Object(object);
        query
    }

    /// A string literal becomes a BINARY datum directly; anything else is a
    /// server-side BINARY term.
    pub(crate) fn make_binary(query: Query) -> Query {
        match query.term {
            Datum::String(data) => Query {
                term: Datum::Binary(data.into_bytes()),
                free_vars: query.free_vars,
            },
            term => Query::new(
                TermType::Binary,
                vec![Query {
                    term,
                    free_vars: query.free_vars,
                }],
                None,
            ),
        }
    }

    /// Send the query and return a cursor over its results.
    pub async fn run(self, conn: &Connection) -> Result<Cursor> {
        self.run_with(conn, OptArgs::new()).await
    }

    /// Send the query with per-run options (`noreply`, `db`, `array_limit`,
    /// `profile`, format selectors; unknown options are forwarded verbatim).
    pub async fn run_with(self, conn: &Connection, optargs: OptArgs) -> Result<Cursor> {
        if !self.free_vars.is_empty() {
            return Err(Error::Driver("run: query has free variables".into()));
        }
        conn.start_query(self.term, optargs).await
    }
}

macro_rules! query_from_scalar {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Query {
            fn from(value: $ty) -> Self {
                Query::from_datum(Datum::from(value))
            }
        })*
    };
}

query_from_scalar!(
    bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String, &str
);

impl From<Datum> for Query {
    fn from(datum: Datum) -> Self {
        Query::from_datum(datum)
    }
}

impl<T: Into<Datum>> From<Vec<T>> for Query {
    fn from(items: Vec<T>) -> Self {
        Query::from_datum(Datum::from(items))
    }
}

impl<T: Into<Datum>> From<BTreeMap<String, T>> for Query {
    fn from(map: BTreeMap<String, T>) -> Self {
        Query::from_datum(Datum::from(map))
    }
}

/// Wrap a thunk as a zero-argument function term.
pub fn func0(f: impl FnOnce() -> Query) -> Query {
    finish_func(Vec::new(), f())
}

/// Wrap a one-argument closure as a function term with a fresh variable.
pub fn func1(f: impl FnOnce(Var) -> Query) -> Query {
    let var = Var::fresh();
    let binders = vec![var.binder.clone()];
    finish_func(binders, f(var))
}

/// Wrap a two-argument closure as a function term with two fresh variables.
pub fn func2(f: impl FnOnce(Var, Var) -> Query) -> Query {
    let a = Var::fresh();
    let b = Var::fresh();
    let binders = vec![a.binder.clone(), b.binder.clone()];
    finish_func(binders, f(a, b))
}

fn finish_func(binders: Vec<Binder>, body: Query) -> Query {
    let mut free_vars = HashMap::new();
    for (id, binder) in body.free_vars {
        if let Some(own) = binders.iter().find(|b| Arc::ptr_eq(b, &binder)) {
            debug_assert_eq!(id, **own, "bound variable id mismatch");
        } else {
            free_vars.insert(id, binder);
        }
    }
    let ids = Datum::Array(vec![
        term_code(TermType::MakeArray),
        Datum::Array(binders.iter().map(|b| Datum::Number(**b as f64)).collect()),
    ]);
    let term = Datum::Array(vec![
        term_code(TermType::Func),
        Datum::Array(vec![ids, body.term]),
    ]);
    Query { term, free_vars }
}

fn needs_func_wrap(datum: &Datum) -> bool {
    match datum {
        Datum::Object(map) => map.values().any(needs_func_wrap),
        Datum::Array(items) => {
            let code = items.first().and_then(Datum::get_number).map(|n| n as u32);
            if code == Some(TermType::ImplicitVar.code()) {
                return true;
            }
            if code == Some(TermType::Func.code()) {
                return false;
            }
            let in_args = items
                .get(1)
                .and_then(Datum::get_array)
                .is_some_and(|args| args.iter().any(needs_func_wrap));
            in_args || items.get(2).is_some_and(needs_func_wrap)
        }
        _ => false,
    }
}

/// Wrap a term containing a free-standing IMPLICIT_VAR (`row()`) as a
/// one-argument function. Terms without one pass through unchanged.
pub fn func_wrap(query: impl Into<Query>) -> Query {
    let query = query.into();
    if !needs_func_wrap(&query.term) {
        return query;
    }
    let id = fresh_var_id(&query.free_vars);
    let ids = Datum::Array(vec![
        term_code(TermType::MakeArray),
        Datum::Array(vec![Datum::Number(id as f64)]),
    ]);
    Query {
        term: Datum::Array(vec![
            term_code(TermType::Func),
            Datum::Array(vec![ids, query.term]),
        ]),
        free_vars: query.free_vars,
    }
}

/// Named options attached to a command or a `run` call.
#[derive(Debug, Clone, Default)]
pub struct OptArgs(pub(crate) BTreeMap<String, Query>);

impl OptArgs {
    pub fn new() -> OptArgs {
        OptArgs::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Query>) -> OptArgs {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Query>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn noreply(&self) -> bool {
        self.0
            .get("noreply")
            .and_then(|q| q.term.get_bool())
            .unwrap_or(false)
    }

    /// Collapse into the wire object. Options cannot reference variables.
    pub(crate) fn into_datum(self) -> Result<Option<Datum>> {
        if self.0.is_empty() {
            return Ok(None);
        }
        let mut object = BTreeMap::new();
        for (key, value) in self.0 {
            if !value.free_vars.is_empty() {
                return Err(Error::Driver(format!("option `{key}` has free variables")));
            }
            object.insert(key, value.term);
        }
        Ok(Some(Datum::Object(object)))
    }
}
