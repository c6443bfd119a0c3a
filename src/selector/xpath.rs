//! Translation of location-path queries onto CSS selectors.
//!
//! Supported:
//!
//! - `//` / `.//` (anywhere), `/` (document root), `./` or bare (under the root element)
//! - `/` child steps and `//` descendant steps, optional `child::` / `descendant::` axes
//! - `preceding-sibling::` and `following-sibling::` steps
//! - a trailing `parent::` step, optionally followed by `text()`
//! - `*` and tag name tests
//! - predicates `[n]`, `[last()]` and `[position() <op> n|last()]` (first
//!   predicate only), `[@a]`, `[@a='v']`, `[@a!='v']`, `[contains(@a,'v')]`,
//!   `[starts-with(@a,'v')]`, `[name()='t']`, `[contains(text(),'v')]`,
//!   nested element paths (`[*[1][name()='svg']]`), `[ancestor::...]`,
//!   `[not(...)]` over those, joined with `and`
//! - a final `text()` or `text()[n]` step
//!
//! Everything else (other axes, arithmetic, `or`) fails with
//! [`SelectorError::UnsupportedPath`].
//!
//! `contains(text(), ...)` has no CSS form; it is returned as a filter on
//! [`PathQuery::text_contains`] and only allowed on the last element step.

use crate::error::SelectorError;
use once_cell::sync::Lazy;
use regex::Regex;

static TAG_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("valid regex"));
static ATTR_EXISTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@([A-Za-z_][A-Za-z0-9_-]*)$").expect("valid regex"));
static ATTR_COMPARE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^@([A-Za-z_][A-Za-z0-9_-]*)\s*(!=|=)\s*(?:'([^']*)'|"([^"]*)")$"#)
        .expect("valid regex")
});
static ATTR_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(contains|starts-with)\(\s*@([A-Za-z_][A-Za-z0-9_-]*)\s*,\s*(?:'([^']*)'|"([^"]*)")\s*\)$"#,
    )
    .expect("valid regex")
});
static NAME_TEST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^name\(\)\s*=\s*(?:'([A-Za-z][A-Za-z0-9_-]*)'|"([A-Za-z][A-Za-z0-9_-]*)")$"#)
        .expect("valid regex")
});
static TEXT_CONTAINS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^contains\(\s*text\(\)\s*,\s*(?:'([^']*)'|"([^"]*)")\s*\)$"#)
        .expect("valid regex")
});
static POSITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^position\(\)\s*(<=|>=|!=|<|>|=)\s*(last\(\)|\d+)$").expect("valid regex")
});
static ELEMENT_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\*|[A-Za-z][A-Za-z0-9_-]*)(\[|/|$)").expect("valid regex"));

/// A translated path query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    /// CSS selector matching the elements the path selects.
    pub css: String,
    /// Substrings the first text child of each `css` match must contain.
    pub text_contains: Vec<String>,
    /// Present when the path ends in a `parent::` step.
    pub parent: Option<ParentStep>,
    /// Present when the path ends in a `text()` step.
    pub text: Option<TextStep>,
}

/// A trailing `parent::` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentStep {
    /// Required tag name; `None` for `parent::*`.
    pub tag: Option<String>,
}

/// A trailing `text()` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStep {
    /// 1-based index from `text()[n]`.
    pub position: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Anywhere,
    Root,
    UnderRoot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Child,
    Descendant,
    Sibling,
}

impl Combinator {
    fn css(&self) -> &'static str {
        match self {
            Combinator::Child => " > ",
            Combinator::Descendant => " ",
            Combinator::Sibling => " ~ ",
        }
    }
}

/// One translated element step.
#[derive(Debug, Default)]
struct Compound {
    css: String,
    text_contains: Vec<String>,
    positional: bool,
}

/// Translate a location path into a [`PathQuery`].
pub fn translate(path: &str) -> Result<PathQuery, SelectorError> {
    let trimmed = path.trim();
    let (anchor, rest) = if let Some(rest) = trimmed.strip_prefix(".//") {
        (Anchor::Anywhere, rest)
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        (Anchor::Anywhere, rest)
    } else if let Some(rest) = trimmed.strip_prefix("./") {
        (Anchor::UnderRoot, rest)
    } else if let Some(rest) = trimmed.strip_prefix('/') {
        (Anchor::Root, rest)
    } else {
        (Anchor::UnderRoot, trimmed)
    };

    let mut compounds: Vec<(Combinator, Compound)> = Vec::new();
    let mut parent = None;
    let mut text = None;

    for (combinator, raw_step) in split_steps(path, rest)? {
        if text.is_some() {
            return Err(SelectorError::unsupported(path, "text() must be the last step"));
        }

        if let Some(test) = raw_step.strip_prefix("parent::") {
            if parent.is_some() || compounds.is_empty() || combinator != Combinator::Child {
                return Err(SelectorError::unsupported(path, "misplaced parent:: step"));
            }
            parent = Some(ParentStep {
                tag: name_test(path, test)?,
            });
            continue;
        }
        if parent.is_some() && !raw_step.starts_with("text()") {
            return Err(SelectorError::unsupported(
                path,
                "only text() may follow a parent:: step",
            ));
        }

        if let Some(test) = raw_step.strip_prefix("preceding-sibling::") {
            let Some((previous_combinator, previous)) = compounds.pop() else {
                return Err(SelectorError::unsupported(path, "sibling step without context"));
            };
            if combinator != Combinator::Child || !previous.text_contains.is_empty() {
                return Err(SelectorError::unsupported(path, "misplaced preceding-sibling:: step"));
            }
            let mut step = sibling_step(path, test)?;
            step.css.push_str(&format!(":has(~ {})", previous.css));
            compounds.push((previous_combinator, step));
            continue;
        }
        if let Some(test) = raw_step.strip_prefix("following-sibling::") {
            if compounds.is_empty() || combinator != Combinator::Child {
                return Err(SelectorError::unsupported(path, "misplaced following-sibling:: step"));
            }
            compounds.push((Combinator::Sibling, sibling_step(path, test)?));
            continue;
        }

        let (combinator, step) = strip_axis(path, combinator, raw_step)?;
        if let Some(after) = step.strip_prefix("text()") {
            if combinator == Combinator::Descendant {
                return Err(SelectorError::unsupported(path, "descendant text() step"));
            }
            text = Some(TextStep {
                position: parse_text_position(path, after)?,
            });
            continue;
        }
        compounds.push((combinator, translate_step(path, step)?));
    }

    let inner = compounds.len().saturating_sub(1);
    if compounds[..inner]
        .iter()
        .any(|(_, c)| !c.text_contains.is_empty())
    {
        return Err(SelectorError::unsupported(
            path,
            "contains(text(), ...) is only supported on the last element step",
        ));
    }
    let text_contains = compounds
        .last_mut()
        .map(|(_, c)| std::mem::take(&mut c.text_contains))
        .unwrap_or_default();

    let mut compounds = compounds.into_iter();
    let Some((first_combinator, first)) = compounds.next() else {
        return Err(SelectorError::unsupported(path, "path selects no elements"));
    };
    let descendant = first_combinator == Combinator::Descendant;
    let mut css = match anchor {
        Anchor::Anywhere => first.css,
        Anchor::Root if descendant => first.css,
        Anchor::Root => format!("{}:root", first.css),
        Anchor::UnderRoot if descendant => format!(":root {}", first.css),
        Anchor::UnderRoot => format!(":root > {}", first.css),
    };
    for (combinator, compound) in compounds {
        css.push_str(combinator.css());
        css.push_str(&compound.css);
    }

    Ok(PathQuery {
        css,
        text_contains,
        parent,
        text,
    })
}

/// Split on `/` and `//` outside brackets and quotes.
fn split_steps<'a>(path: &str, rest: &'a str) -> Result<Vec<(Combinator, &'a str)>, SelectorError> {
    let bytes = rest.as_bytes();
    let mut steps = Vec::new();
    let mut combinator = Combinator::Child;
    let mut start = 0;
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'[' | b'(' => depth += 1,
                b']' | b')' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| SelectorError::unsupported(path, "unbalanced brackets"))?;
                }
                b'/' if depth == 0 => {
                    steps.push((combinator, non_empty(path, &rest[start..i])?));
                    if bytes.get(i + 1) == Some(&b'/') {
                        combinator = Combinator::Descendant;
                        i += 1;
                    } else {
                        combinator = Combinator::Child;
                    }
                    start = i + 1;
                }
                _ => {}
            },
        }
        i += 1;
    }
    if depth != 0 || quote.is_some() {
        return Err(SelectorError::unsupported(path, "unbalanced brackets or quotes"));
    }
    steps.push((combinator, non_empty(path, &rest[start..])?));
    Ok(steps)
}

fn non_empty<'a>(path: &str, step: &'a str) -> Result<&'a str, SelectorError> {
    let step = step.trim();
    if step.is_empty() {
        Err(SelectorError::unsupported(path, "empty step"))
    } else {
        Ok(step)
    }
}

fn strip_axis<'a>(
    path: &str,
    combinator: Combinator,
    step: &'a str,
) -> Result<(Combinator, &'a str), SelectorError> {
    if let Some(rest) = step.strip_prefix("child::") {
        return Ok((combinator, rest));
    }
    if let Some(rest) = step.strip_prefix("descendant::") {
        return Ok((Combinator::Descendant, rest));
    }
    let name_part = step.split('[').next().unwrap_or(step);
    if name_part.contains("::") {
        return Err(SelectorError::unsupported(path, format!("axis in step `{step}`")));
    }
    if matches!(step, "." | ".." | "node()") {
        return Err(SelectorError::unsupported(path, format!("step `{step}`")));
    }
    Ok((combinator, step))
}

/// `*` or a bare tag name, without predicates.
fn name_test(path: &str, test: &str) -> Result<Option<String>, SelectorError> {
    let test = test.trim();
    if test == "*" {
        Ok(None)
    } else if TAG_NAME.is_match(test) {
        Ok(Some(test.to_string()))
    } else {
        Err(SelectorError::unsupported(path, format!("node test `{test}`")))
    }
}

/// Sibling axes count positions away from the context node, which CSS
/// cannot express.
fn sibling_step(path: &str, step: &str) -> Result<Compound, SelectorError> {
    let compound = translate_step(path, step)?;
    if compound.positional || !compound.text_contains.is_empty() {
        return Err(SelectorError::unsupported(
            path,
            format!("predicate on sibling step `{step}`"),
        ));
    }
    Ok(compound)
}

fn parse_text_position(path: &str, after: &str) -> Result<Option<usize>, SelectorError> {
    if after.is_empty() {
        return Ok(None);
    }
    after
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .map(Some)
        .ok_or_else(|| SelectorError::unsupported(path, format!("text() predicate `{after}`")))
}

/// Translate one `name[pred][pred]` step into a CSS compound selector.
fn translate_step(path: &str, step: &str) -> Result<Compound, SelectorError> {
    let name_end = step.find('[').unwrap_or(step.len());
    let mut tag = step[..name_end].trim().to_string();
    let wildcard = tag == "*";
    if !wildcard && !TAG_NAME.is_match(&tag) {
        return Err(SelectorError::unsupported(path, format!("node test `{tag}`")));
    }

    let mut compound = Compound::default();
    let mut suffix = String::new();
    for (index, predicate) in split_predicates(path, &step[name_end..])?.into_iter().enumerate() {
        let predicate = predicate.trim();
        if let Some(pseudo) = positional(path, predicate, wildcard)? {
            if index > 0 {
                return Err(SelectorError::unsupported(
                    path,
                    "positional predicate after a filter",
                ));
            }
            compound.positional = true;
            suffix.push_str(&pseudo);
            continue;
        }
        if split_top_level(predicate, " or ").len() > 1 {
            return Err(SelectorError::unsupported(path, "`or` in predicate"));
        }
        for atom in split_top_level(predicate, " and ") {
            let atom = atom.trim();
            if let Some(caps) = NAME_TEST.captures(atom) {
                let wanted = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
                if tag == "*" {
                    tag = wanted.to_string();
                } else if !tag.eq_ignore_ascii_case(wanted) {
                    suffix.push_str(":not(*)");
                }
            } else if let Some(caps) = TEXT_CONTAINS.captures(atom) {
                let needle = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
                compound.text_contains.push(needle.to_string());
            } else {
                suffix.push_str(&translate_filter(path, atom)?);
            }
        }
    }
    compound.css = format!("{tag}{suffix}");
    Ok(compound)
}

/// CSS for a positional predicate, or `None` when `predicate` is not one.
fn positional(path: &str, predicate: &str, wildcard: bool) -> Result<Option<String>, SelectorError> {
    let nth = |expr: &str| {
        if wildcard {
            format!(":nth-child({expr})")
        } else {
            format!(":nth-of-type({expr})")
        }
    };
    let last = if wildcard { ":last-child" } else { ":last-of-type" };

    if let Ok(n) = predicate.parse::<usize>() {
        if n == 0 {
            return Err(SelectorError::unsupported(path, "position 0"));
        }
        return Ok(Some(nth(&n.to_string())));
    }
    if predicate == "last()" {
        return Ok(Some(last.to_string()));
    }
    let Some(caps) = POSITION.captures(predicate) else {
        return Ok(None);
    };
    let op = &caps[1];
    if &caps[2] == "last()" {
        return match op {
            "=" | ">=" => Ok(Some(last.to_string())),
            "<" | "!=" => Ok(Some(format!(":not({last})"))),
            "<=" => Ok(Some(String::new())),
            _ => Ok(Some(":not(*)".to_string())),
        };
    }
    let n: i64 = caps[2]
        .parse()
        .map_err(|_| SelectorError::unsupported(path, format!("position `{}`", &caps[2])))?;
    Ok(Some(match op {
        "=" => nth(&n.to_string()),
        "!=" => format!(":not({})", nth(&n.to_string())),
        "<" => nth(&format!("-n+{}", n - 1)),
        "<=" => nth(&format!("-n+{n}")),
        ">" => nth(&format!("n+{}", n + 1)),
        _ => nth(&format!("n+{n}")),
    }))
}

/// Split `[a][b]` into `["a", "b"]`.
fn split_predicates<'a>(path: &str, preds: &'a str) -> Result<Vec<&'a str>, SelectorError> {
    let bytes = preds.as_bytes();
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut start = 0;

    for (i, &b) in bytes.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'[' => {
                    if depth == 0 {
                        start = i + 1;
                    }
                    depth += 1;
                }
                b']' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| SelectorError::unsupported(path, "unbalanced brackets"))?;
                    if depth == 0 {
                        out.push(&preds[start..i]);
                    }
                }
                _ if depth == 0 && !b.is_ascii_whitespace() => {
                    return Err(SelectorError::unsupported(
                        path,
                        format!("unexpected `{}` after node test", b as char),
                    ));
                }
                _ => {}
            },
        }
    }
    Ok(out)
}

/// Split `expr` on `sep` where it appears outside parentheses, brackets
/// and quotes.
fn split_top_level<'a>(expr: &'a str, sep: &str) -> Vec<&'a str> {
    let bytes = expr.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth = depth.saturating_sub(1),
                _ if depth == 0 && expr[i..].starts_with(sep) => {
                    parts.push(&expr[start..i]);
                    i += sep.len();
                    start = i;
                    continue;
                }
                _ => {}
            },
        }
        i += 1;
    }
    parts.push(&expr[start..]);
    parts
}

fn translate_filter(path: &str, atom: &str) -> Result<String, SelectorError> {
    if let Some(inner) = atom
        .strip_prefix("not(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let inner_css = split_top_level(inner.trim(), " and ")
            .into_iter()
            .map(|part| translate_filter(path, part.trim()))
            .collect::<Result<String, _>>()?;
        return Ok(format!(":not({inner_css})"));
    }

    if let Some(caps) = ATTR_EXISTS.captures(atom) {
        return Ok(format!("[{}]", &caps[1]));
    }
    if let Some(caps) = ATTR_COMPARE.captures(atom) {
        let name = &caps[1];
        let value = caps.get(3).or_else(|| caps.get(4)).map_or("", |m| m.as_str());
        return Ok(if &caps[2] == "=" {
            format!("[{name}={}]", css_string(value))
        } else {
            format!("[{name}]:not([{name}={}])", css_string(value))
        });
    }
    if let Some(caps) = ATTR_FUNCTION.captures(atom) {
        let op = if &caps[1] == "contains" { "*=" } else { "^=" };
        let value = caps.get(3).or_else(|| caps.get(4)).map_or("", |m| m.as_str());
        return Ok(format!("[{}{op}{}]", &caps[2], css_string(value)));
    }
    if let Some(caps) = NAME_TEST.captures(atom) {
        let wanted = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        return Ok(format!(":is({wanted})"));
    }
    if let Some(step) = atom.strip_prefix("ancestor::") {
        let ancestor = translate_step(path, step)?;
        if ancestor.positional || !ancestor.text_contains.is_empty() {
            return Err(SelectorError::unsupported(path, format!("ancestor predicate `{atom}`")));
        }
        return Ok(format!(":is({} *)", ancestor.css));
    }
    if ELEMENT_PATH.is_match(atom) {
        return Ok(format!(":has(> {})", relative_path(path, atom)?));
    }
    Err(SelectorError::unsupported(path, format!("predicate `{atom}`")))
}

/// A relative element path inside a predicate, e.g. `*[1][name()='svg']`.
fn relative_path(path: &str, rel: &str) -> Result<String, SelectorError> {
    let mut css = String::new();
    for (index, (combinator, raw_step)) in split_steps(path, rel)?.into_iter().enumerate() {
        let (combinator, step) = strip_axis(path, combinator, raw_step)?;
        let compound = translate_step(path, step)?;
        if !compound.text_contains.is_empty() {
            return Err(SelectorError::unsupported(path, "text test inside a nested path"));
        }
        if index > 0 {
            css.push_str(combinator.css());
        }
        css.push_str(&compound.css);
    }
    Ok(css)
}

fn css_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
