//! 占位符扫描与改写
//!
//! 所有函数都是纯函数：按从左到右的顺序处理 SQL 文本，跳过单引号字符串、
//! 双引号和反引号标识符以及注释中的内容。

use crate::dialect::{Dialect, PlaceholderStyle};
use crate::error::{Result, SqlGateError};
use crate::value::BindValue;

/// SQL 文本被切分后的片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlPart {
    Text(String),
    /// `?`
    Positional,
    /// `$N`（从 1 开始）
    Numbered(usize),
    /// `@paramN`（从 0 开始）
    Named(usize),
}

/// 引号或注释之外的代码，以及原样保留的引号/注释内容
#[derive(Debug, Clone, PartialEq, Eq)]
enum Span {
    Code(String),
    Opaque(String),
}

/// 按引号与注释切分 SQL
///
/// 单引号字符串、双引号和反引号标识符、`--` 行注释和 `/* */` 块注释都算作不透明内容。
/// 未闭合的引号或注释一直延续到文本末尾。
fn spans(sql: &str) -> Vec<Span> {
    let chars: Vec<char> = sql.chars().collect();
    let mut spans = Vec::new();
    let mut code = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let end = match (c, next) {
            ('\'', _) | ('"', _) | ('`', _) => Some(quoted_end(&chars, i, c)),
            ('-', Some('-')) => Some(
                chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map_or(chars.len(), |p| i + p),
            ),
            ('/', Some('*')) => Some(
                (i + 2..chars.len().saturating_sub(1))
                    .find(|&j| chars[j] == '*' && chars[j + 1] == '/')
                    .map_or(chars.len(), |j| j + 2),
            ),
            _ => None,
        };

        match end {
            Some(end) => {
                if !code.is_empty() {
                    spans.push(Span::Code(std::mem::take(&mut code)));
                }
                spans.push(Span::Opaque(chars[i..end].iter().collect()));
                i = end;
            }
            None => {
                code.push(c);
                i += 1;
            }
        }
    }

    if !code.is_empty() {
        spans.push(Span::Code(code));
    }
    spans
}

/// 从 `start` 处的引号开始，返回闭合引号之后的位置；连续两个引号是转义
fn quoted_end(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// 去掉引号内容与注释后的 SQL，每段不透明内容替换为一个空格
pub fn code_only(sql: &str) -> String {
    spans(sql)
        .into_iter()
        .map(|span| match span {
            Span::Code(code) => code,
            Span::Opaque(_) => " ".to_string(),
        })
        .collect()
}

/// 把 SQL 切分为文本与占位符
///
/// 引号和注释中的 `?`、`$1`、`@param0` 不是占位符。
pub fn parse(sql: &str) -> Vec<SqlPart> {
    let mut parts = Vec::new();
    let mut text = String::new();

    for span in spans(sql) {
        match span {
            Span::Opaque(opaque) => text.push_str(&opaque),
            Span::Code(code) => scan_code(&code, &mut parts, &mut text),
        }
    }

    flush(&mut parts, &mut text);
    parts
}

fn scan_code(code: &str, parts: &mut Vec<SqlPart>, text: &mut String) {
    let chars: Vec<char> = code.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '?' => {
                flush(parts, text);
                parts.push(SqlPart::Positional);
                i += 1;
            }
            '$' => {
                let digits = take_digits(&chars, i + 1);
                match digits.parse::<usize>() {
                    Ok(n) if n > 0 => {
                        flush(parts, text);
                        parts.push(SqlPart::Numbered(n));
                        i += 1 + digits.len();
                    }
                    _ => {
                        text.push(c);
                        i += 1;
                    }
                }
            }
            '@' if matches_word(&chars, i + 1, "param") => {
                let digits = take_digits(&chars, i + 6);
                match digits.parse::<usize>() {
                    Ok(n) => {
                        flush(parts, text);
                        parts.push(SqlPart::Named(n));
                        i += 6 + digits.len();
                    }
                    Err(_) => {
                        text.push(c);
                        i += 1;
                    }
                }
            }
            _ => {
                text.push(c);
                i += 1;
            }
        }
    }
}

fn flush(parts: &mut Vec<SqlPart>, text: &mut String) {
    if !text.is_empty() {
        parts.push(SqlPart::Text(std::mem::take(text)));
    }
}

fn take_digits(chars: &[char], start: usize) -> String {
    chars
        .iter()
        .skip(start)
        .take_while(|c| c.is_ascii_digit())
        .collect()
}

fn matches_word(chars: &[char], start: usize, word: &str) -> bool {
    let len = word.chars().count();
    if start + len > chars.len() {
        return false;
    }
    chars[start..start + len]
        .iter()
        .zip(word.chars())
        .all(|(a, b)| a.eq_ignore_ascii_case(&b))
}

pub fn count_positional(sql: &str) -> usize {
    parse(sql)
        .iter()
        .filter(|p| matches!(p, SqlPart::Positional))
        .count()
}

pub fn has_numbered(sql: &str) -> bool {
    parse(sql).iter().any(|p| matches!(p, SqlPart::Numbered(_)))
}

/// `$k` 改写为 `?`，并按出现顺序重新排列参数
///
/// 同一个 `$k` 出现多次时，对应参数会被追加多次。
pub fn rewrite_numbered_to_positional(
    sql: &str,
    params: &[BindValue],
) -> Result<(String, Vec<BindValue>)> {
    let mut out = String::with_capacity(sql.len());
    let mut ordered = Vec::with_capacity(params.len());

    for part in parse(sql) {
        match part {
            SqlPart::Text(t) => out.push_str(&t),
            SqlPart::Numbered(k) => {
                let value = params.get(k - 1).ok_or_else(|| {
                    SqlGateError::builder(format!(
                        "placeholder ${} has no parameter ({} supplied)",
                        k,
                        params.len()
                    ))
                })?;
                out.push('?');
                ordered.push(value.clone());
            }
            SqlPart::Positional => out.push('?'),
            SqlPart::Named(n) => out.push_str(&format!("@param{}", n)),
        }
    }

    Ok((out, ordered))
}

/// `$1 -> $(1+offset)`，其余内容保持不变
pub fn rebase_placeholders(sql: &str, offset: usize) -> String {
    parse(sql)
        .into_iter()
        .map(|part| match part {
            SqlPart::Text(t) => t,
            SqlPart::Numbered(k) => format!("${}", k + offset),
            SqlPart::Positional => "?".to_string(),
            SqlPart::Named(n) => format!("@param{}", n),
        })
        .collect()
}

/// `?` 依次改写为 `$1, $2, ...`
pub fn positional_to_numbered(sql: &str) -> String {
    let mut index = 0;
    parse(sql)
        .into_iter()
        .map(|part| match part {
            SqlPart::Text(t) => t,
            SqlPart::Positional => {
                index += 1;
                format!("${}", index)
            }
            SqlPart::Numbered(k) => format!("${}", k),
            SqlPart::Named(n) => format!("@param{}", n),
        })
        .collect()
}

/// `$k` 改写为 `@param{k-1}`，`?` 依次改写为 `@param0, @param1, ...`
pub fn numbered_to_named(sql: &str) -> String {
    let mut index = 0;
    parse(sql)
        .into_iter()
        .map(|part| match part {
            SqlPart::Text(t) => t,
            SqlPart::Numbered(k) => format!("@param{}", k - 1),
            SqlPart::Positional => {
                let token = format!("@param{}", index);
                index += 1;
                token
            }
            SqlPart::Named(n) => format!("@param{}", n),
        })
        .collect()
}

/// 把任意风格的占位符调整为目标方言可以执行的形式
///
/// 构建器输出的 SQL 已经是目标方言的形式，这里主要服务于手写的原始 SQL。
pub fn normalize_for(
    dialect: &Dialect,
    sql: &str,
    params: &[BindValue],
) -> Result<(String, Vec<BindValue>)> {
    match dialect.placeholder {
        PlaceholderStyle::Positional => {
            if has_numbered(sql) {
                rewrite_numbered_to_positional(sql, params)
            } else {
                Ok((sql.to_string(), params.to_vec()))
            }
        }
        PlaceholderStyle::Numbered => {
            if !params.is_empty() && !has_numbered(sql) && count_positional(sql) > 0 {
                Ok((positional_to_numbered(sql), params.to_vec()))
            } else {
                Ok((sql.to_string(), params.to_vec()))
            }
        }
        PlaceholderStyle::Named => {
            if params.is_empty() {
                Ok((sql.to_string(), Vec::new()))
            } else {
                Ok((numbered_to_named(sql), params.to_vec()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MYSQL, MSSQL, POSTGRES};

    #[test]
    fn test_parse_skips_quoted_text() {
        let parts = parse("SELECT '?', \"$1\" FROM t WHERE a = ? AND b = $2");
        assert_eq!(
            parts,
            vec![
                SqlPart::Text("SELECT '?', \"$1\" FROM t WHERE a = ".to_string()),
                SqlPart::Positional,
                SqlPart::Text(" AND b = ".to_string()),
                SqlPart::Numbered(2),
            ]
        );
    }

    #[test]
    fn test_rewrite_numbered_reorders_params() {
        let params = vec![BindValue::from("a"), BindValue::from("b")];
        let (sql, ordered) =
            rewrite_numbered_to_positional("x = $2 AND y = $1 AND z = $2", &params).unwrap();
        assert_eq!(sql, "x = ? AND y = ? AND z = ?");
        assert_eq!(
            ordered,
            vec![BindValue::from("b"), BindValue::from("a"), BindValue::from("b")]
        );
    }

    #[test]
    fn test_rewrite_numbered_out_of_range() {
        let err = rewrite_numbered_to_positional("x = $3", &[BindValue::Null]).unwrap_err();
        assert!(err.is_builder_error());
    }

    #[test]
    fn test_rebase_placeholders() {
        assert_eq!(
            rebase_placeholders("a = $1 OR b = $2 OR c = '$1'", 3),
            "a = $4 OR b = $5 OR c = '$1'"
        );
    }

    #[test]
    fn test_parse_skips_comments() {
        let parts = parse("SELECT a -- why? $1\nFROM t /* ? @param0 */ WHERE b = ?");
        assert_eq!(
            parts,
            vec![
                SqlPart::Text("SELECT a -- why? $1\nFROM t /* ? @param0 */ WHERE b = ".to_string()),
                SqlPart::Positional,
            ]
        );
        assert_eq!(count_positional("SELECT 1 -- trailing ?"), 0);
        assert_eq!(
            positional_to_numbered("a = ? /* unclosed ? "),
            "a = $1 /* unclosed ? "
        );
    }

    #[test]
    fn test_code_only_blanks_literals_and_comments() {
        assert_eq!(
            code_only("UPDATE \"jobs\" SET \"output\" = 'RETURNING' -- returning"),
            "UPDATE   SET   =    "
        );
    }

    #[test]
    fn test_minus_and_division_are_code() {
        assert_eq!(
            positional_to_numbered("SELECT a - ?, b / ? FROM t"),
            "SELECT a - $1, b / $2 FROM t"
        );
    }

    #[test]
    fn test_dollar_without_digits_is_text() {
        assert_eq!(parse("SELECT $$body$$"), vec![SqlPart::Text("SELECT $$body$$".to_string())]);
    }

    #[test]
    fn test_normalize_for_each_dialect() {
        let params = vec![BindValue::from(1), BindValue::from(2)];

        let (sql, _) = normalize_for(&POSTGRES, "a = ? AND b = ?", &params).unwrap();
        assert_eq!(sql, "a = $1 AND b = $2");

        let (sql, ordered) = normalize_for(&MYSQL, "a = $2 AND b = $1", &params).unwrap();
        assert_eq!(sql, "a = ? AND b = ?");
        assert_eq!(ordered, vec![BindValue::from(2), BindValue::from(1)]);

        let (sql, _) = normalize_for(&MSSQL, "a = $1 AND b = $2", &params).unwrap();
        assert_eq!(sql, "a = @param0 AND b = @param1");
    }

    #[test]
    fn test_positional_left_alone_without_params() {
        let (sql, _) = normalize_for(&POSTGRES, "SELECT data ? 'key' FROM t", &[]).unwrap();
        assert_eq!(sql, "SELECT data ? 'key' FROM t");
    }
}
