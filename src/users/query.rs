use std::collections::HashMap;

use sqlx::{Postgres, QueryBuilder};

use crate::error::ApiError;

/// Columns a list query may filter on and return. Everything else,
/// password hash included, stays server-side.
pub const SUMMARY_FIELDS: [&str; 7] = [
    "name",
    "email",
    "username",
    "bio",
    "url",
    "twitter",
    "background",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Op {
    fn sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "<>",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Lt => "<",
            Op::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Text(String),
    Number(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: &'static str,
    pub op: Op,
    pub value: Operand,
}

/// Filter parsed from query parameters: `?username=jo&background=>=2`.
/// Values may carry a comparison prefix; bare values mean equality.
#[derive(Debug, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn parse(params: &HashMap<String, String>) -> Result<Self, ApiError> {
        let mut conditions = Vec::with_capacity(params.len());
        for (key, raw) in params {
            let field = SUMMARY_FIELDS
                .iter()
                .copied()
                .find(|f| *f == key.as_str())
                .ok_or_else(|| ApiError::Validation(format!("unknown filter field: {key}")))?;

            let (op, rest) = split_op(raw);
            let value = if field == "background" {
                let n = rest.parse::<i32>().map_err(|_| {
                    ApiError::Validation(format!("background filter expects an integer, got {rest:?}"))
                })?;
                Operand::Number(n)
            } else {
                Operand::Text(rest.to_string())
            };

            conditions.push(Condition { field, op, value });
        }
        Ok(Self { conditions })
    }

    /// Appends the WHERE clause. Column names are the whitelisted statics
    /// above; values are always bound parameters.
    pub fn apply(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        for (i, cond) in self.conditions.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            qb.push(cond.field);
            qb.push(" ");
            qb.push(cond.op.sql());
            qb.push(" ");
            match &cond.value {
                Operand::Text(s) => qb.push_bind(s.clone()),
                Operand::Number(n) => qb.push_bind(*n),
            };
        }
    }
}

fn split_op(raw: &str) -> (Op, &str) {
    for (prefix, op) in [
        (">=", Op::Gte),
        ("<=", Op::Lte),
        ("!=", Op::Ne),
        (">", Op::Gt),
        ("<", Op::Lt),
    ] {
        if let Some(rest) = raw.strip_prefix(prefix) {
            return (op, rest);
        }
    }
    (Op::Eq, raw)
}
