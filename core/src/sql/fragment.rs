use crate::dialect::Dialect;
use crate::error::{Result, SqlGateError};
use crate::placeholder::{self, SqlPart};
use crate::value::BindValue;

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Text(String),
    /// 渲染时按方言加引号
    Ident(String),
    Param(BindValue),
    /// 复合查询分支两侧的括号，SQLite 不接受
    CompoundParen(bool),
    /// 分页子句，写法取决于方言
    Limit {
        has_order: bool,
        limit: Option<u64>,
        offset: Option<u64>,
    },
}

/// 未渲染的 SQL 片段
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Fragment {
    pieces: Vec<Piece>,
}

impl Fragment {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn text(sql: impl Into<String>) -> Self {
        let mut fragment = Self::new();
        fragment.push_text(&sql.into());
        fragment
    }

    /// 把带占位符的原始 SQL 转为片段
    ///
    /// `?` 依次取参数，`$k` 取第 k 个参数，`@paramN` 取第 N+1 个参数。
    pub(crate) fn from_sql(sql: &str, params: &[BindValue]) -> Result<Self> {
        let mut fragment = Self::new();
        let mut next_positional = 0;
        let mut only_positional = true;

        for part in placeholder::parse(sql) {
            let index = match part {
                SqlPart::Text(text) => {
                    fragment.push_text(&text);
                    continue;
                }
                SqlPart::Positional => {
                    next_positional += 1;
                    next_positional - 1
                }
                SqlPart::Numbered(k) => {
                    only_positional = false;
                    k - 1
                }
                SqlPart::Named(n) => {
                    only_positional = false;
                    n
                }
            };
            let value = params.get(index).ok_or_else(|| {
                SqlGateError::builder(format!(
                    "placeholder #{} has no parameter ({} supplied): {}",
                    index + 1,
                    params.len(),
                    sql
                ))
            })?;
            fragment.push_param(value.clone());
        }

        if only_positional && next_positional != params.len() {
            return Err(SqlGateError::builder(format!(
                "{} placeholder(s) but {} parameter(s): {}",
                next_positional,
                params.len(),
                sql
            )));
        }
        Ok(fragment)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub(crate) fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Piece::Text(last)) = self.pieces.last_mut() {
            last.push_str(text);
        } else {
            self.pieces.push(Piece::Text(text.to_string()));
        }
    }

    pub(crate) fn push_ident(&mut self, name: &str) {
        self.pieces.push(Piece::Ident(name.to_string()));
    }

    pub(crate) fn push_param(&mut self, value: BindValue) {
        self.pieces.push(Piece::Param(value));
    }

    /// `p, p, p`
    pub(crate) fn push_param_list(&mut self, values: impl IntoIterator<Item = BindValue>) {
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                self.push_text(", ");
            }
            self.push_param(value);
        }
    }

    pub(crate) fn push_limit(&mut self, has_order: bool, limit: Option<u64>, offset: Option<u64>) {
        if limit.is_some() || offset.is_some() {
            self.pieces.push(Piece::Limit {
                has_order,
                limit,
                offset,
            });
        }
    }

    /// 复合查询分支的左括号（`open`）或右括号
    pub(crate) fn push_compound_paren(&mut self, open: bool) {
        self.pieces.push(Piece::CompoundParen(open));
    }

    pub(crate) fn append(&mut self, other: Fragment) {
        for piece in other.pieces {
            match piece {
                Piece::Text(text) => self.push_text(&text),
                piece => self.pieces.push(piece),
            }
        }
    }

    pub(crate) fn build(&self, dialect: &Dialect) -> BuiltQuery {
        let mut sql = String::new();
        let mut params = Vec::new();
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => sql.push_str(text),
                Piece::Ident(name) => sql.push_str(&dialect.quote_identifier(name)),
                Piece::CompoundParen(open) if dialect.compound_parens => {
                    sql.push(if *open { '(' } else { ')' })
                }
                Piece::CompoundParen(_) => {}
                Piece::Param(value) => {
                    sql.push_str(&dialect.placeholder(params.len()));
                    params.push(value.clone());
                }
                Piece::Limit {
                    has_order,
                    limit,
                    offset,
                } => sql.push_str(&dialect.limit_clause(*has_order, *limit, *offset)),
            }
        }
        BuiltQuery { sql, params }
    }
}

/// 渲染完成的语句
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<BindValue>,
}
