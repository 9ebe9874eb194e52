//! Typed filter construction.
//!
//! Collections take native filter documents. [`Expr`] and [`Query`] are a typed way to
//! write the same thing: both compile to a native filter, and anything implementing
//! [`IntoFilter`] can be passed where a filter is expected.
//!
//! ```ignore
//! use docmodel::query::{Filter, Query, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("status", "published").and(Filter::gte("karma", 10)))
//!     .sort("karma", SortDirection::Desc)
//!     .sort("name", SortDirection::Asc)
//!     .limit(20)
//!     .build();
//!
//! let popular = articles.find(query, FindOptions::new()).await?;
//! ```

use bson::{Bson, Document, doc};

use crate::{
    backend::QueryOptions,
    error::{DocModelError, DocModelResult},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl From<SortDirection> for Bson {
    fn from(direction: SortDirection) -> Self {
        match direction {
            SortDirection::Asc => Bson::Int32(1),
            SortDirection::Desc => Bson::Int32(-1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Operator of a single-field condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Equal to one of an array of values.
    In,
    /// Equal to none of an array of values.
    Nin,
    /// Array field holding every given value.
    All,
    /// Array field of the given length.
    Size,
    /// String field matching a regular expression.
    Matches,
    StartsWith,
    EndsWith,
    /// String field containing a substring.
    Contains,
}

impl FieldOp {
    /// The native operator, for operators that pass their operand through unchanged.
    fn native(&self) -> Option<&'static str> {
        Some(match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::In => "$in",
            FieldOp::Nin => "$nin",
            FieldOp::All => "$all",
            FieldOp::Size => "$size",
            FieldOp::Matches | FieldOp::StartsWith | FieldOp::EndsWith | FieldOp::Contains => {
                return None;
            }
        })
    }
}

/// A filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Exists { field: String, present: bool },
    Field { field: String, op: FieldOp, value: Bson },
    /// A native filter document embedded as is.
    Native(Document),
}

impl Expr {
    pub fn field(field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Self {
        Expr::Field { field: field.into(), op, value: value.into() }
    }

    /// Both expressions must match. Nested conjunctions are flattened.
    pub fn and(self, other: Expr) -> Self {
        let mut clauses = match self {
            Expr::And(clauses) => clauses,
            expr => vec![expr],
        };
        match other {
            Expr::And(more) => clauses.extend(more),
            expr => clauses.push(expr),
        }
        Expr::And(clauses)
    }

    /// Either expression must match. Nested disjunctions are flattened.
    pub fn or(self, other: Expr) -> Self {
        let mut clauses = match self {
            Expr::Or(clauses) => clauses,
            expr => vec![expr],
        };
        match other {
            Expr::Or(more) => clauses.extend(more),
            expr => clauses.push(expr),
        }
        Expr::Or(clauses)
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Compiles the expression into a native filter document.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::Validation`] when an operator gets an operand it cannot
    /// use, e.g. `starts_with` with a number or `in` with a scalar.
    pub fn compile(&self) -> DocModelResult<Document> {
        FilterCompiler.visit_expr(self)
    }
}

impl From<Document> for Expr {
    fn from(document: Document) -> Self {
        Expr::Native(document)
    }
}

/// Constructors for [`Expr`].
pub struct Filter;

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Lte, value)
    }

    pub fn any_of<I, V>(field: impl Into<String>, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Expr::field(field, FieldOp::In, array(values))
    }

    pub fn none_of<I, V>(field: impl Into<String>, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Expr::field(field, FieldOp::Nin, array(values))
    }

    pub fn contains_all<I, V>(field: impl Into<String>, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Expr::field(field, FieldOp::All, array(values))
    }

    pub fn size(field: impl Into<String>, len: i32) -> Expr {
        Expr::field(field, FieldOp::Size, len)
    }

    /// Matches string fields against a regular expression.
    pub fn matches(field: impl Into<String>, pattern: impl Into<String>) -> Expr {
        Expr::field(field, FieldOp::Matches, pattern.into())
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Expr {
        Expr::field(field, FieldOp::StartsWith, prefix.into())
    }

    pub fn ends_with(field: impl Into<String>, suffix: impl Into<String>) -> Expr {
        Expr::field(field, FieldOp::EndsWith, suffix.into())
    }

    pub fn contains(field: impl Into<String>, text: impl Into<String>) -> Expr {
        Expr::field(field, FieldOp::Contains, text.into())
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists { field: field.into(), present: true }
    }

    pub fn missing(field: impl Into<String>) -> Expr {
        Expr::Exists { field: field.into(), present: false }
    }

    pub fn all(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn any(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }
}

fn array<I, V>(values: I) -> Bson
where
    I: IntoIterator<Item = V>,
    V: Into<Bson>,
{
    Bson::Array(values.into_iter().map(Into::into).collect())
}

/// A filter together with cursor options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Expr>,
    pub sort: Vec<Sort>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub projection: Option<Document>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// The cursor options carried by the query.
    pub fn options(&self) -> QueryOptions {
        let sort = (!self.sort.is_empty()).then(|| {
            self.sort
                .iter()
                .map(|sort| (sort.field.clone(), Bson::from(sort.direction)))
                .collect::<Document>()
        });

        QueryOptions {
            sort,
            skip: self.skip,
            limit: self.limit,
            projection: self.projection.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition. Repeated calls are combined with AND.
    pub fn filter(mut self, expr: impl Into<Expr>) -> Self {
        let expr = expr.into();
        self.query.filter = Some(match self.query.filter.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Adds a sort key after the ones already given.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort { field: field.into(), direction });
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.query.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Returns only the given fields (and `_id`).
    pub fn only<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let projection = fields
            .into_iter()
            .map(|field| {
                let field: String = field.into();
                (field, Bson::Int32(1))
            })
            .collect();
        self.query.projection = Some(projection);
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

/// Walks an [`Expr`] tree.
pub trait QueryVisitor {
    type Output;

    fn visit_and(&mut self, exprs: &[Expr]) -> DocModelResult<Self::Output>;
    fn visit_or(&mut self, exprs: &[Expr]) -> DocModelResult<Self::Output>;
    fn visit_not(&mut self, expr: &Expr) -> DocModelResult<Self::Output>;
    fn visit_exists(&mut self, field: &str, present: bool) -> DocModelResult<Self::Output>;
    fn visit_field(
        &mut self,
        field: &str,
        op: FieldOp,
        value: &Bson,
    ) -> DocModelResult<Self::Output>;
    fn visit_native(&mut self, document: &Document) -> DocModelResult<Self::Output>;

    fn visit_expr(&mut self, expr: &Expr) -> DocModelResult<Self::Output> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists { field, present } => self.visit_exists(field, *present),
            Expr::Field { field, op, value } => self.visit_field(field, *op, value),
            Expr::Native(document) => self.visit_native(document),
        }
    }
}

/// Compiles expressions into native filter documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterCompiler;

impl FilterCompiler {
    fn clauses(&mut self, exprs: &[Expr]) -> DocModelResult<Vec<Document>> {
        exprs.iter().map(|expr| self.visit_expr(expr)).collect()
    }
}

/// Escapes regular expression metacharacters.
fn literal(text: &str) -> String {
    text.chars().fold(String::with_capacity(text.len()), |mut escaped, c| {
        if r"\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
        escaped
    })
}

impl QueryVisitor for FilterCompiler {
    type Output = Document;

    fn visit_and(&mut self, exprs: &[Expr]) -> DocModelResult<Document> {
        let mut clauses = self.clauses(exprs)?;
        Ok(match clauses.len() {
            0 => Document::new(),
            1 => clauses.remove(0),
            _ => doc! { "$and": clauses },
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> DocModelResult<Document> {
        if exprs.is_empty() {
            return Err(DocModelError::validation("or requires at least one expression"));
        }
        Ok(doc! { "$or": self.clauses(exprs)? })
    }

    fn visit_not(&mut self, expr: &Expr) -> DocModelResult<Document> {
        Ok(doc! { "$nor": [self.visit_expr(expr)?] })
    }

    fn visit_exists(&mut self, field: &str, present: bool) -> DocModelResult<Document> {
        Ok(doc! { field: { "$exists": present } })
    }

    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Bson) -> DocModelResult<Document> {
        let takes_array = matches!(op, FieldOp::In | FieldOp::Nin | FieldOp::All);
        if takes_array && !matches!(value, Bson::Array(_)) {
            return Err(DocModelError::validation(format!("{:?} requires an array of values", op)));
        }

        if let Some(operator) = op.native() {
            return Ok(doc! { field: { operator: value.clone() } });
        }

        let text = value
            .as_str()
            .ok_or_else(|| DocModelError::validation(format!("{:?} requires a string value", op)))?;
        let pattern = match op {
            FieldOp::StartsWith => format!("^{}", literal(text)),
            FieldOp::EndsWith => format!("{}$", literal(text)),
            FieldOp::Contains => literal(text),
            _ => text.to_string(),
        };

        Ok(doc! { field: { "$regex": pattern } })
    }

    fn visit_native(&mut self, document: &Document) -> DocModelResult<Document> {
        Ok(document.clone())
    }
}

/// Anything usable as a filter: native documents, expressions and queries.
pub trait IntoFilter {
    /// The native filter document and the cursor options carried along with it.
    fn into_filter(self) -> DocModelResult<(Document, QueryOptions)>;
}

impl IntoFilter for Document {
    fn into_filter(self) -> DocModelResult<(Document, QueryOptions)> {
        Ok((self, QueryOptions::default()))
    }
}

impl IntoFilter for Option<Document> {
    fn into_filter(self) -> DocModelResult<(Document, QueryOptions)> {
        Ok((self.unwrap_or_default(), QueryOptions::default()))
    }
}

impl IntoFilter for Expr {
    fn into_filter(self) -> DocModelResult<(Document, QueryOptions)> {
        Ok((self.compile()?, QueryOptions::default()))
    }
}

impl IntoFilter for Query {
    fn into_filter(self) -> DocModelResult<(Document, QueryOptions)> {
        let options = self.options();
        let filter = match &self.filter {
            Some(expr) => expr.compile()?,
            None => Document::new(),
        };
        Ok((filter, options))
    }
}
