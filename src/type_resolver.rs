//! Parsing of textual SQL type descriptors such as `"Decimal(18,2)"` or
//! `"VarChar(MAX)"` into catalog types plus their arguments.

use std::fmt;

/// The supported SQL Server parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Bit,
    BigInt,
    Decimal,
    Float,
    Int,
    Money,
    Numeric,
    SmallInt,
    SmallMoney,
    Real,
    TinyInt,
    Char,
    NChar,
    Text,
    NText,
    VarChar,
    NVarChar,
    Xml,
    Time,
    Date,
    DateTime,
    DateTime2,
    DateTimeOffset,
    SmallDateTime,
    UniqueIdentifier,
    Variant,
    Binary,
    VarBinary,
    Image,
    Udt,
    Geography,
    Geometry,
}

impl SqlType {
    /// Every catalog entry, in catalog order.
    pub const ALL: [SqlType; 32] = [
        SqlType::Bit,
        SqlType::BigInt,
        SqlType::Decimal,
        SqlType::Float,
        SqlType::Int,
        SqlType::Money,
        SqlType::Numeric,
        SqlType::SmallInt,
        SqlType::SmallMoney,
        SqlType::Real,
        SqlType::TinyInt,
        SqlType::Char,
        SqlType::NChar,
        SqlType::Text,
        SqlType::NText,
        SqlType::VarChar,
        SqlType::NVarChar,
        SqlType::Xml,
        SqlType::Time,
        SqlType::Date,
        SqlType::DateTime,
        SqlType::DateTime2,
        SqlType::DateTimeOffset,
        SqlType::SmallDateTime,
        SqlType::UniqueIdentifier,
        SqlType::Variant,
        SqlType::Binary,
        SqlType::VarBinary,
        SqlType::Image,
        SqlType::Udt,
        SqlType::Geography,
        SqlType::Geometry,
    ];

    /// Canonical catalog spelling.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SqlType::Bit => "Bit",
            SqlType::BigInt => "BigInt",
            SqlType::Decimal => "Decimal",
            SqlType::Float => "Float",
            SqlType::Int => "Int",
            SqlType::Money => "Money",
            SqlType::Numeric => "Numeric",
            SqlType::SmallInt => "SmallInt",
            SqlType::SmallMoney => "SmallMoney",
            SqlType::Real => "Real",
            SqlType::TinyInt => "TinyInt",
            SqlType::Char => "Char",
            SqlType::NChar => "NChar",
            SqlType::Text => "Text",
            SqlType::NText => "NText",
            SqlType::VarChar => "VarChar",
            SqlType::NVarChar => "NVarChar",
            SqlType::Xml => "Xml",
            SqlType::Time => "Time",
            SqlType::Date => "Date",
            SqlType::DateTime => "DateTime",
            SqlType::DateTime2 => "DateTime2",
            SqlType::DateTimeOffset => "DateTimeOffset",
            SqlType::SmallDateTime => "SmallDateTime",
            SqlType::UniqueIdentifier => "UniqueIdentifier",
            SqlType::Variant => "Variant",
            SqlType::Binary => "Binary",
            SqlType::VarBinary => "VarBinary",
            SqlType::Image => "Image",
            SqlType::Udt => "UDT",
            SqlType::Geography => "Geography",
            SqlType::Geometry => "Geometry",
        }
    }

    /// Case-insensitive catalog lookup.
    #[must_use]
    pub fn from_name(token: &str) -> Option<SqlType> {
        SqlType::ALL
            .iter()
            .copied()
            .find(|ty| ty.name().eq_ignore_ascii_case(token))
    }

    /// T-SQL keyword used when declaring a variable of this type.
    ///
    /// `Text`, `NText` and `Image` cannot be local variables, so they map to
    /// their `(MAX)` replacements.
    fn keyword(self) -> &'static str {
        match self {
            SqlType::Bit => "BIT",
            SqlType::BigInt => "BIGINT",
            SqlType::Decimal => "DECIMAL",
            SqlType::Float => "FLOAT",
            SqlType::Int => "INT",
            SqlType::Money => "MONEY",
            SqlType::Numeric => "NUMERIC",
            SqlType::SmallInt => "SMALLINT",
            SqlType::SmallMoney => "SMALLMONEY",
            SqlType::Real => "REAL",
            SqlType::TinyInt => "TINYINT",
            SqlType::Char => "CHAR",
            SqlType::NChar => "NCHAR",
            SqlType::Text | SqlType::VarChar => "VARCHAR",
            SqlType::NText | SqlType::NVarChar => "NVARCHAR",
            SqlType::Xml => "XML",
            SqlType::Time => "TIME",
            SqlType::Date => "DATE",
            SqlType::DateTime => "DATETIME",
            SqlType::DateTime2 => "DATETIME2",
            SqlType::DateTimeOffset => "DATETIMEOFFSET",
            SqlType::SmallDateTime => "SMALLDATETIME",
            SqlType::UniqueIdentifier => "UNIQUEIDENTIFIER",
            SqlType::Variant => "SQL_VARIANT",
            SqlType::Binary => "BINARY",
            SqlType::Image | SqlType::Udt | SqlType::VarBinary => "VARBINARY",
            SqlType::Geography => "GEOGRAPHY",
            SqlType::Geometry => "GEOMETRY",
        }
    }

    /// Declaration used when no arguments were given.
    fn bare_declaration(self) -> String {
        match self {
            // An unsized VARCHAR variable is VARCHAR(1); default to MAX instead.
            SqlType::VarChar
            | SqlType::NVarChar
            | SqlType::VarBinary
            | SqlType::Text
            | SqlType::NText
            | SqlType::Image
            | SqlType::Udt => format!("{}(MAX)", self.keyword()),
            _ => self.keyword().to_string(),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One argument inside the parentheses of a type descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeArg {
    /// A numeric length, precision or scale.
    Number(f64),
    /// The `MAX` sentinel.
    Max,
    /// Anything else, trimmed (collation or UDT names).
    Literal(String),
}

impl fmt::Display for TypeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeArg::Number(n) => write!(f, "{n}"),
            TypeArg::Max => f.write_str("MAX"),
            TypeArg::Literal(s) => f.write_str(s),
        }
    }
}

/// Result of parsing a type descriptor. `base` is `None` when the leading token
/// is not in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub base: Option<SqlType>,
    pub extensions: Vec<TypeArg>,
}

impl TypeDescriptor {
    /// Build the concrete parameter type, or `None` for an unknown base.
    #[must_use]
    pub fn to_param_type(&self) -> Option<ParamType> {
        let base = self.base?;
        Some(if self.extensions.is_empty() {
            ParamType::bare(base)
        } else {
            ParamType::parametric(base, self.extensions.clone())
        })
    }
}

/// Parse a descriptor such as `"Decimal(18,2)"`. Never fails: an unknown type
/// comes back with `base: None`.
#[must_use]
pub fn resolve_type(text: &str) -> TypeDescriptor {
    let open = text.find('(');
    let base_token = match open {
        Some(idx) => &text[..idx],
        None => text,
    }
    .trim();

    let Some(base) = SqlType::from_name(base_token) else {
        return TypeDescriptor {
            base: None,
            extensions: Vec::new(),
        };
    };

    let extensions = match open {
        Some(idx) => {
            let inner: String = text[idx..].chars().filter(|c| *c != '(' && *c != ')').collect();
            if inner.is_empty() {
                Vec::new()
            } else {
                inner.split(',').map(parse_arg).collect()
            }
        }
        None => Vec::new(),
    };

    TypeDescriptor {
        base: Some(base),
        extensions,
    }
}

// Numbers must parse in full; `10x` stays a literal and is rejected when bound.
fn parse_arg(piece: &str) -> TypeArg {
    let trimmed = piece.trim();
    if let Ok(n) = trimmed.parse::<f64>()
        && n.is_finite()
    {
        return TypeArg::Number(n);
    }
    if trimmed.eq_ignore_ascii_case("MAX") {
        TypeArg::Max
    } else {
        TypeArg::Literal(trimmed.to_string())
    }
}

/// A concrete parameter type ready to be declared on the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamType {
    pub base: SqlType,
    pub args: Vec<TypeArg>,
}

impl ParamType {
    #[must_use]
    pub fn bare(base: SqlType) -> Self {
        Self {
            base,
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn parametric(base: SqlType, args: Vec<TypeArg>) -> Self {
        Self { base, args }
    }

    /// T-SQL type text, e.g. `DECIMAL(18,2)` or `NVARCHAR(MAX)`.
    ///
    /// A `UDT` with a literal argument declares that named type; a trailing
    /// literal on a character type is emitted as its collation.
    #[must_use]
    pub fn declaration(&self) -> String {
        if self.args.is_empty() {
            return self.base.bare_declaration();
        }

        if self.base == SqlType::Udt
            && let [TypeArg::Literal(name)] = self.args.as_slice()
        {
            return name.clone();
        }

        let (sizes, collation): (Vec<&TypeArg>, Vec<&TypeArg>) = self
            .args
            .iter()
            .partition(|arg| !matches!(arg, TypeArg::Literal(_)));

        let mut decl = if sizes.is_empty() {
            self.base.bare_declaration()
        } else {
            let joined = sizes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            format!("{}({joined})", self.base.keyword())
        };

        if let Some(TypeArg::Literal(name)) = collation.last() {
            decl.push_str(" COLLATE ");
            decl.push_str(name);
        }
        decl
    }

    /// Literal arguments, which end up spliced into the declaration text.
    pub(crate) fn literal_args(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(|arg| match arg {
            TypeArg::Literal(s) => Some(s.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.declaration())
    }
}
