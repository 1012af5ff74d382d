//! Wire-protocol enums: term types, query types, response types and error
//! kinds.
//!
//! The discriminant values are the protocol's own numeric codes; they appear
//! verbatim inside the serialized query arrays and response objects, so they
//! must never be renumbered.

use crate::error::{Error, Result, ServerErrorKind};

macro_rules! term_types {
    ($($variant:ident = $code:expr, $name:literal;)*) => {
        /// A query-language operation, one per protocol term code.
        ///
        /// Composite terms serialize as `[type_code, args, optargs]`, so each
        /// variant's numeric value is part of the wire format.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum TermType {
            $($variant = $code,)*
        }

        impl TermType {
            /// The protocol name of the term, for debugging and errors.
            pub fn name(&self) -> &'static str {
                match self {
                    $(TermType::$variant => $name,)*
                }
            }
        }
    };
}

term_types! {
    // Core data
    Datum = 1, "DATUM";
    MakeArray = 2, "MAKE_ARRAY";
    MakeObj = 3, "MAKE_OBJ";

    // Variables and functions
    Var = 10, "VAR";
    Javascript = 11, "JAVASCRIPT";
    Error = 12, "ERROR";
    ImplicitVar = 13, "IMPLICIT_VAR";
    Funcall = 64, "FUNCALL";
    Func = 69, "FUNC";

    // Databases and tables
    Db = 14, "DB";
    Table = 15, "TABLE";
    Get = 16, "GET";
    GetAll = 78, "GET_ALL";
    DbCreate = 57, "DB_CREATE";
    DbDrop = 58, "DB_DROP";
    DbList = 59, "DB_LIST";
    TableCreate = 60, "TABLE_CREATE";
    TableDrop = 61, "TABLE_DROP";
    TableList = 62, "TABLE_LIST";

    // Comparison
    Eq = 17, "EQ";
    Ne = 18, "NE";
    Lt = 19, "LT";
    Le = 20, "LE";
    Gt = 21, "GT";
    Ge = 22, "GE";

    // Logic and math
    Not = 23, "NOT";
    Add = 24, "ADD";
    Sub = 25, "SUB";
    Mul = 26, "MUL";
    Div = 27, "DIV";
    Mod = 28, "MOD";
    Floor = 183, "FLOOR";
    Ceil = 184, "CEIL";
    Round = 185, "ROUND";
    Or = 66, "OR";
    And = 67, "AND";

    // Arrays and sets
    Append = 29, "APPEND";
    Prepend = 80, "PREPEND";
    Difference = 95, "DIFFERENCE";
    SetInsert = 88, "SET_INSERT";
    SetIntersection = 89, "SET_INTERSECTION";
    SetUnion = 90, "SET_UNION";
    SetDifference = 91, "SET_DIFFERENCE";
    InsertAt = 82, "INSERT_AT";
    DeleteAt = 83, "DELETE_AT";
    ChangeAt = 84, "CHANGE_AT";
    SpliceAt = 85, "SPLICE_AT";

    // Sequences
    Slice = 30, "SLICE";
    Skip = 70, "SKIP";
    Limit = 71, "LIMIT";
    OffsetsOf = 87, "OFFSETS_OF";
    Contains = 93, "CONTAINS";
    IsEmpty = 86, "IS_EMPTY";
    Union = 44, "UNION";
    Nth = 45, "NTH";
    Bracket = 170, "BRACKET";
    Sample = 81, "SAMPLE";
    Range = 173, "RANGE";

    // Objects
    GetField = 31, "GET_FIELD";
    HasFields = 32, "HAS_FIELDS";
    WithFields = 96, "WITH_FIELDS";
    Keys = 94, "KEYS";
    Values = 186, "VALUES";
    Object = 143, "OBJECT";
    Pluck = 33, "PLUCK";
    Without = 34, "WITHOUT";
    Merge = 35, "MERGE";
    Literal = 137, "LITERAL";

    // Transformations and aggregation
    Between = 182, "BETWEEN";
    Reduce = 37, "REDUCE";
    Map = 38, "MAP";
    Fold = 187, "FOLD";
    Filter = 39, "FILTER";
    ConcatMap = 40, "CONCAT_MAP";
    OrderBy = 41, "ORDER_BY";
    Distinct = 42, "DISTINCT";
    Count = 43, "COUNT";
    Group = 144, "GROUP";
    Ungroup = 150, "UNGROUP";
    Sum = 145, "SUM";
    Avg = 146, "AVG";
    Min = 147, "MIN";
    Max = 148, "MAX";
    Asc = 73, "ASC";
    Desc = 74, "DESC";

    // Joins
    InnerJoin = 48, "INNER_JOIN";
    OuterJoin = 49, "OUTER_JOIN";
    EqJoin = 50, "EQ_JOIN";
    Zip = 72, "ZIP";

    // Strings
    Match = 97, "MATCH";
    Split = 149, "SPLIT";
    Upcase = 141, "UPCASE";
    Downcase = 142, "DOWNCASE";

    // Writes
    Update = 53, "UPDATE";
    Delete = 54, "DELETE";
    Replace = 55, "REPLACE";
    Insert = 56, "INSERT";
    Sync = 138, "SYNC";

    // Secondary indexes
    IndexCreate = 75, "INDEX_CREATE";
    IndexDrop = 76, "INDEX_DROP";
    IndexList = 77, "INDEX_LIST";
    IndexStatus = 139, "INDEX_STATUS";
    IndexWait = 140, "INDEX_WAIT";
    IndexRename = 156, "INDEX_RENAME";

    // Control flow and misc
    Branch = 65, "BRANCH";
    ForEach = 68, "FOR_EACH";
    Default = 92, "DEFAULT";
    CoerceTo = 51, "COERCE_TO";
    TypeOf = 52, "TYPE_OF";
    Info = 79, "INFO";
    Json = 98, "JSON";
    ToJsonString = 172, "TO_JSON_STRING";
    Args = 154, "ARGS";
    Binary = 155, "BINARY";
    Uuid = 169, "UUID";
    Random = 151, "RANDOM";
    Now = 103, "NOW";
    Changes = 152, "CHANGES";
    Minval = 180, "MINVAL";
    Maxval = 181, "MAXVAL";
}

impl TermType {
    /// The numeric wire code for this term.
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl std::fmt::Display for TermType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The kind of a client-to-server query envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QueryType {
    Start = 1,
    Continue = 2,
    Stop = 3,
    NoreplyWait = 4,
    ServerInfo = 5,
}

impl QueryType {
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// The kind of a server-to-client response (its `t` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResponseType {
    SuccessAtom = 1,
    SuccessSequence = 2,
    SuccessPartial = 3,
    WaitComplete = 4,
    ServerInfo = 5,
    ClientError = 16,
    CompileError = 17,
    RuntimeError = 18,
}

impl ResponseType {
    /// Decode the raw `t` value; unknown codes are a protocol error.
    pub fn from_code(code: f64) -> Result<Self> {
        match code as i64 {
            1 => Ok(ResponseType::SuccessAtom),
            2 => Ok(ResponseType::SuccessSequence),
            3 => Ok(ResponseType::SuccessPartial),
            4 => Ok(ResponseType::WaitComplete),
            5 => Ok(ResponseType::ServerInfo),
            16 => Ok(ResponseType::ClientError),
            17 => Ok(ResponseType::CompileError),
            18 => Ok(ResponseType::RuntimeError),
            other => Err(Error::Protocol(format!("unknown response type {other}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseType::SuccessAtom => "SUCCESS_ATOM",
            ResponseType::SuccessSequence => "SUCCESS_SEQUENCE",
            ResponseType::SuccessPartial => "SUCCESS_PARTIAL",
            ResponseType::WaitComplete => "WAIT_COMPLETE",
            ResponseType::ServerInfo => "SERVER_INFO",
            ResponseType::ClientError => "CLIENT_ERROR",
            ResponseType::CompileError => "COMPILE_ERROR",
            ResponseType::RuntimeError => "RUNTIME_ERROR",
        }
    }
}

/// The error class of a RUNTIME_ERROR response (its `e` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorType {
    Internal = 1_000_000,
    ResourceLimit = 2_000_000,
    QueryLogic = 3_000_000,
    NonExistence = 3_100_000,
    OpFailed = 4_100_000,
    OpIndeterminate = 4_200_000,
    User = 5_000_000,
    PermissionError = 6_000_000,
}

impl ErrorType {
    /// Decode the raw `e` value; unknown codes are a protocol error.
    pub fn from_code(code: f64) -> Result<Self> {
        match code as i64 {
            1_000_000 => Ok(ErrorType::Internal),
            2_000_000 => Ok(ErrorType::ResourceLimit),
            3_000_000 => Ok(ErrorType::QueryLogic),
            3_100_000 => Ok(ErrorType::NonExistence),
            4_100_000 => Ok(ErrorType::OpFailed),
            4_200_000 => Ok(ErrorType::OpIndeterminate),
            5_000_000 => Ok(ErrorType::User),
            6_000_000 => Ok(ErrorType::PermissionError),
            other => Err(Error::Protocol(format!("unknown error type {other}"))),
        }
    }

    /// The server-error classification this error type maps to.
    pub fn kind(self) -> ServerErrorKind {
        match self {
            ErrorType::Internal => ServerErrorKind::Internal,
            ErrorType::ResourceLimit => ServerErrorKind::ResourceLimit,
            ErrorType::QueryLogic => ServerErrorKind::QueryLogic,
            ErrorType::NonExistence => ServerErrorKind::NonExistence,
            ErrorType::OpFailed => ServerErrorKind::OpFailed,
            ErrorType::OpIndeterminate => ServerErrorKind::OpIndeterminate,
            ErrorType::User => ServerErrorKind::User,
            ErrorType::PermissionError => ServerErrorKind::Permission,
        }
    }
}
