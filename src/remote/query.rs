//! Query descriptions for the remote tabular store.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
  Eq,
  Neq,
  Gt,
  Gte,
  Lt,
  Lte,
  In,
}

impl FilterOp {
  /// Operator name as used in PostgREST filter expressions.
  pub fn as_str(&self) -> &'static str {
    match self {
      FilterOp::Eq => "eq",
      FilterOp::Neq => "neq",
      FilterOp::Gt => "gt",
      FilterOp::Gte => "gte",
      FilterOp::Lt => "lt",
      FilterOp::Lte => "lte",
      FilterOp::In => "in",
    }
  }
}

/// A single `column <op> value` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
  pub column: String,
  pub op: FilterOp,
  pub value: Value,
}

impl Filter {
  pub fn eq(column: &str, value: impl Into<Value>) -> Self {
    Self {
      column: column.to_string(),
      op: FilterOp::Eq,
      value: value.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
  pub column: String,
  pub ascending: bool,
}

/// A read against one table.
///
/// Built fresh for every call and cloned into each attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
  pub table: String,
  /// Projected columns; `None` selects every column
  pub columns: Option<Vec<String>>,
  pub filters: Vec<Filter>,
  pub order: Option<Order>,
  pub limit: Option<usize>,
  /// At most one row may match
  pub single: bool,
}

impl Query {
  pub fn table(table: &str) -> Self {
    Self {
      table: table.to_string(),
      columns: None,
      filters: Vec::new(),
      order: None,
      limit: None,
      single: false,
    }
  }

  pub fn select(mut self, columns: &[&str]) -> Self {
    self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
    self
  }

  pub fn filter(mut self, column: &str, op: FilterOp, value: impl Into<Value>) -> Self {
    self.filters.push(Filter {
      column: column.to_string(),
      op,
      value: value.into(),
    });
    self
  }

  pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
    self.filter(column, FilterOp::Eq, value)
  }

  pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
    self.filter(column, FilterOp::Gte, value)
  }

  pub fn is_in<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
    let values: Vec<Value> = values.into_iter().map(Into::into).collect();
    self.filter(column, FilterOp::In, Value::Array(values))
  }

  pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
    self.order = Some(Order {
      column: column.to_string(),
      ascending,
    });
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }

  pub fn single(mut self) -> Self {
    self.single = true;
    self
  }
}
