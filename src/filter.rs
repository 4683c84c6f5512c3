/*!
Row filter expressions for carving subsets out of a [`Dataset`](crate::dataset::Dataset).

An expression is one or more clauses `<column> <op> <number>` joined by `and` or `&`:

```rust
use mcmc_bench::filter::Filter;

let f = Filter::parse("x > 0.5 and y <= 3").unwrap();
assert_eq!(f.clauses().len(), 2);
assert!(Filter::parse("x >").is_err());
```
*/

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Op {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "<" => Some(Op::Lt),
            "<=" => Some(Op::Le),
            ">" => Some(Op::Gt),
            ">=" => Some(Op::Ge),
            "==" => Some(Op::Eq),
            "!=" => Some(Op::Ne),
            _ => None,
        }
    }

    fn eval(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Op::Lt => lhs < rhs,
            Op::Le => lhs <= rhs,
            Op::Gt => lhs > rhs,
            Op::Ge => lhs >= rhs,
            Op::Eq => lhs == rhs,
            Op::Ne => lhs != rhs,
        }
    }
}

/// A single `<column> <op> <value>` comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub column: String,
    pub op: Op,
    pub value: f64,
}

impl Clause {
    pub fn matches(&self, x: f64) -> bool {
        self.op.eval(x, self.value)
    }
}

/// A conjunction of clauses, as parsed from its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    source: String,
    clauses: Vec<Clause>,
}

impl Filter {
    /// Parses a filter expression. Operators may be written with or without surrounding spaces.
    pub fn parse(expr: &str) -> Result<Self> {
        let malformed = |reason: &str| Error::Filter {
            expr: expr.to_string(),
            reason: reason.to_string(),
        };

        let normalized = expr.replace('&', " and ");
        let mut clauses = Vec::new();
        for part in normalized.split(" and ") {
            let part = part.trim();
            if part.is_empty() {
                return Err(malformed("empty clause"));
            }
            let (column, op, value) = split_clause(part)
                .ok_or_else(|| malformed("expected `<column> <op> <number>`"))?;
            if column.is_empty() || column.contains(char::is_whitespace) {
                return Err(malformed("invalid column name"));
            }
            let value: f64 = value
                .parse()
                .map_err(|_| malformed(&format!("`{value}` is not a number")))?;
            clauses.push(Clause {
                column: column.to_string(),
                op,
                value,
            });
        }

        Ok(Self {
            source: expr.to_string(),
            clauses,
        })
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Splits `lhs op rhs` on the first comparison operator. Two-character operators win.
fn split_clause(part: &str) -> Option<(&str, Op, &str)> {
    let pos = part.find(['<', '>', '=', '!'])?;
    let rest = &part[pos..];
    let width = match rest.get(..2).and_then(Op::parse) {
        Some(_) => 2,
        None => 1,
    };
    let op = Op::parse(rest.get(..width)?)?;
    let lhs = part[..pos].trim();
    let rhs = rest[width..].trim();
    if rhs.is_empty() {
        return None;
    }
    Some((lhs, op, rhs))
}
