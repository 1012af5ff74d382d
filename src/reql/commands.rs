//! The ReQL command surface: top-level constructors and the chainable
//! methods on [`Query`].
//!
//! Conventionally imported as `r`:
//!
//! ```rust,ignore
//! use photondb_client::r;
//!
//! let query = r::table("users").filter(r::row().bracket("age").gt(30));
//! ```
//!
//! Commands are thin shims over [`Query::new`]; the macros below generate
//! the mechanical ones. Argument positions that accept a predicate or
//! projection pass through [`func_wrap`] so `row()` works there. Named
//! options are attached with [`Query::opt`] (or `run_with` for run options)
//! rather than per-command parameters.

pub use crate::reql::query::{func0, func1, func2, func_wrap, OptArgs, Query, Var};

use crate::reql::datum::Datum;
use crate::reql::terms::TermType;

/// Wrap a native value or sub-query as a query term.
pub fn expr(value: impl Into<Query>) -> Query {
    value.into()
}

macro_rules! top0 {
    ($(#[$meta:meta])* $name:ident, $term:ident) => {
        $(#[$meta])*
        pub fn $name() -> Query {
            Query::new(TermType::$term, vec![], None)
        }
    };
}

macro_rules! top1 {
    ($(#[$meta:meta])* $name:ident, $term:ident) => {
        $(#[$meta])*
        pub fn $name(arg: impl Into<Query>) -> Query {
            Query::new(TermType::$term, vec![arg.into()], None)
        }
    };
}

macro_rules! top1_wrap {
    ($(#[$meta:meta])* $name:ident, $term:ident) => {
        $(#[$meta])*
        pub fn $name(arg: impl Into<Query>) -> Query {
            Query::new(TermType::$term, vec![func_wrap(arg)], None)
        }
    };
}

macro_rules! top2 {
    ($(#[$meta:meta])* $name:ident, $term:ident) => {
        $(#[$meta])*
        pub fn $name(a: impl Into<Query>, b: impl Into<Query>) -> Query {
            Query::new(TermType::$term, vec![a.into(), b.into()], None)
        }
    };
}

top1! {
    /// Reference a database by name.
    db, Db
}
top1!(db_create, DbCreate);
top1!(db_drop, DbDrop);
top0!(db_list, DbList);
top1! {
    /// Reference a table in the default database.
    table, Table
}
top1!(table_create, TableCreate);
top1!(table_drop, TableDrop);
top0!(table_list, TableList);
top1! {
    /// A lazy stream of integers from 0 to `end` (exclusive).
    range, Range
}
top0! {
    /// An unbounded stream of integers from 0.
    range_all, Range
}
top2! {
    /// A lazy stream of integers from `start` to `end` (exclusive).
    range_between, Range
}
top1!(json, Json);
top1!(js, Javascript);
top1!(error, Error);
top0!(uuid, Uuid);
top0!(random, Random);
top0! {
    /// The server's current time, returned as its epoch-time object.
    now, Now
}
top1!(args, Args);
top1!(literal, Literal);
top1_wrap!(asc, Asc);
top1_wrap!(desc, Desc);
top0! {
    /// The implicit variable: the current document in a predicate position.
    row, ImplicitVar
}
top0!(minval, Minval);
top0!(maxval, Maxval);

/// Evaluate `test` and run one of two branches.
pub fn branch(
    test: impl Into<Query>,
    if_true: impl Into<Query>,
    if_false: impl Into<Query>,
) -> Query {
    Query::new(
        TermType::Branch,
        vec![test.into(), if_true.into(), if_false.into()],
        None,
    )
}

/// Build an object from alternating key/value arguments. Distinct string
/// keys produce an object literal; anything else becomes a server-side
/// OBJECT term.
pub fn object<I, T>(args: I) -> Query
where
    I: IntoIterator<Item = T>,
    T: Into<Query>,
{
    Query::make_object(args.into_iter().map(Into::into).collect())
}

/// Build a binary value. String literals embed directly as a BINARY datum.
pub fn binary(data: impl Into<Query>) -> Query {
    Query::make_binary(data.into())
}

/// A term representing null.
pub fn nil() -> Query {
    expr(Datum::Null)
}

macro_rules! cmd0 {
    ($(#[$meta:meta])* $name:ident, $term:ident) => {
        $(#[$meta])*
        pub fn $name(self) -> Query {
            Query::new(TermType::$term, vec![self], None)
        }
    };
}

macro_rules! cmd1 {
    ($(#[$meta:meta])* $name:ident, $term:ident) => {
        $(#[$meta])*
        pub fn $name(self, arg: impl Into<Query>) -> Query {
            Query::new(TermType::$term, vec![self, arg.into()], None)
        }
    };
}

macro_rules! cmd1_wrap {
    ($(#[$meta:meta])* $name:ident, $term:ident) => {
        $(#[$meta])*
        pub fn $name(self, arg: impl Into<Query>) -> Query {
            Query::new(TermType::$term, vec![self, func_wrap(arg)], None)
        }
    };
}

macro_rules! cmd2 {
    ($(#[$meta:meta])* $name:ident, $term:ident) => {
        $(#[$meta])*
        pub fn $name(self, a: impl Into<Query>, b: impl Into<Query>) -> Query {
            Query::new(TermType::$term, vec![self, a.into(), b.into()], None)
        }
    };
}

macro_rules! cmd2_wrap {
    ($(#[$meta:meta])* $name:ident, $term:ident) => {
        $(#[$meta])*
        pub fn $name(self, a: impl Into<Query>, b: impl Into<Query>) -> Query {
            Query::new(TermType::$term, vec![self, func_wrap(a), func_wrap(b)], None)
        }
    };
}

macro_rules! cmd_many {
    ($(#[$meta:meta])* $name:ident, $term:ident) => {
        $(#[$meta])*
        pub fn $name<I, T>(self, args: I) -> Query
        where
            I: IntoIterator<Item = T>,
            T: Into<Query>,
        {
            let mut all = vec![self];
            all.extend(args.into_iter().map(Into::into));
            Query::new(TermType::$term, all, None)
        }
    };
}

impl Query {
    // Tables and documents
    cmd1!(table, Table);
    cmd1!(table_create, TableCreate);
    cmd1!(table_drop, TableDrop);
    cmd0!(table_list, TableList);
    cmd1!(get, Get);
    cmd_many!(get_all, GetAll);
    cmd2!(between, Between);

    // Writes
    cmd1!(insert, Insert);
    cmd1_wrap!(update, Update);
    cmd1_wrap!(replace, Replace);
    cmd0!(delete, Delete);
    cmd0!(sync, Sync);

    // Secondary indexes
    cmd1!(index_create, IndexCreate);
    cmd1!(index_drop, IndexDrop);
    cmd0!(index_list, IndexList);
    cmd0!(index_status, IndexStatus);
    cmd0!(index_wait, IndexWait);
    cmd2!(index_rename, IndexRename);

    // Selection and transformation
    cmd1_wrap! {
        /// Filter a sequence by a predicate object or function. `row()` is
        /// wrapped into a one-argument function automatically.
        filter, Filter
    }
    cmd1_wrap!(map, Map);
    cmd1_wrap!(concat_map, ConcatMap);
    cmd1_wrap!(order_by, OrderBy);
    cmd1!(skip, Skip);
    cmd1!(limit, Limit);
    cmd2!(slice, Slice);
    cmd1!(nth, Nth);
    cmd1_wrap!(offsets_of, OffsetsOf);
    cmd0!(is_empty, IsEmpty);
    cmd1!(union, Union);
    cmd1!(sample, Sample);
    cmd_many!(with_fields, WithFields);
    cmd0!(changes, Changes);

    // Joins
    cmd2!(inner_join, InnerJoin);
    cmd2!(outer_join, OuterJoin);
    cmd2_wrap!(eq_join, EqJoin);
    cmd0!(zip, Zip);

    // Aggregation
    cmd1_wrap!(group, Group);
    cmd0!(ungroup, Ungroup);
    cmd1!(reduce, Reduce);
    cmd2!(fold, Fold);
    cmd0! {
        /// The number of elements in the sequence.
        count, Count
    }
    cmd1_wrap!(count_by, Count);
    cmd0!(sum, Sum);
    cmd1_wrap!(sum_by, Sum);
    cmd0!(avg, Avg);
    cmd1_wrap!(avg_by, Avg);
    cmd0!(min, Min);
    cmd1_wrap!(min_by, Min);
    cmd0!(max, Max);
    cmd1_wrap!(max_by, Max);
    cmd0!(distinct, Distinct);
    cmd1_wrap!(contains, Contains);

    // Documents and objects
    cmd_many!(pluck, Pluck);
    cmd_many!(without, Without);
    cmd1_wrap!(merge, Merge);
    cmd1!(bracket, Bracket);
    cmd1!(get_field, GetField);
    cmd_many!(has_fields, HasFields);
    cmd0!(keys, Keys);
    cmd0!(values, Values);

    // Arrays
    cmd1!(append, Append);
    cmd1!(prepend, Prepend);
    cmd1!(difference, Difference);
    cmd1!(set_insert, SetInsert);
    cmd1!(set_union, SetUnion);
    cmd1!(set_intersection, SetIntersection);
    cmd1!(set_difference, SetDifference);
    cmd2!(insert_at, InsertAt);
    cmd2!(splice_at, SpliceAt);
    cmd1!(delete_at, DeleteAt);
    cmd2!(change_at, ChangeAt);

    // Strings
    cmd1!(match_, Match);
    cmd0!(split, Split);
    cmd1!(split_on, Split);
    cmd0!(upcase, Upcase);
    cmd0!(downcase, Downcase);

    // Math and logic
    cmd1!(add, Add);
    cmd1!(sub, Sub);
    cmd1!(mul, Mul);
    cmd1!(div, Div);
    cmd1!(mod_, Mod);
    cmd0!(floor, Floor);
    cmd0!(ceil, Ceil);
    cmd0!(round, Round);
    cmd1!(and, And);
    cmd1!(or, Or);
    cmd1!(eq, Eq);
    cmd1!(ne, Ne);
    cmd1!(gt, Gt);
    cmd1!(ge, Ge);
    cmd1!(lt, Lt);
    cmd1!(le, Le);
    cmd0!(not, Not);

    // Control flow and misc
    cmd1_wrap!(for_each, ForEach);
    cmd1!(default, Default);
    cmd1!(coerce_to, CoerceTo);
    cmd0!(type_of, TypeOf);
    cmd0!(info, Info);
    cmd0!(to_json_string, ToJsonString);

    /// Call a function with this value as its argument (`FUNCALL`). The
    /// function goes first in the serialized args, then the value.
    pub fn do_(self, f: impl Into<Query>) -> Query {
        Query::new(TermType::Funcall, vec![func_wrap(f), self], None)
    }
}

impl<T: Into<Query>> std::ops::Add<T> for Query {
    type Output = Query;
    fn add(self, rhs: T) -> Query {
        Query::new(TermType::Add, vec![self, rhs.into()], None)
    }
}

impl<T: Into<Query>> std::ops::Sub<T> for Query {
    type Output = Query;
    fn sub(self, rhs: T) -> Query {
        Query::new(TermType::Sub, vec![self, rhs.into()], None)
    }
}

impl<T: Into<Query>> std::ops::Mul<T> for Query {
    type Output = Query;
    fn mul(self, rhs: T) -> Query {
        Query::new(TermType::Mul, vec![self, rhs.into()], None)
    }
}

impl<T: Into<Query>> std::ops::Div<T> for Query {
    type Output = Query;
    fn div(self, rhs: T) -> Query {
        Query::new(TermType::Div, vec![self, rhs.into()], None)
    }
}

impl<T: Into<Query>> std::ops::Rem<T> for Query {
    type Output = Query;
    fn rem(self, rhs: T) -> Query {
        Query::new(TermType::Mod, vec![self, rhs.into()], None)
    }
}

impl std::ops::Not for Query {
    type Output = Query;
    fn not(self) -> Query {
        Query::new(TermType::Not, vec![self], None)
    }
}
