//! Declared output types: parsing, resolution against the namespace, and
//! structural matching.
//!
//! A declared type is Python type-expression text (`int`, `list[str]`,
//! `dict[str, list[float]] | None`, `pd.DataFrame`). It is parsed into a
//! [`TypeExpr`], resolved into a closed set of [`Matcher`]s using the current
//! namespace, and then checked against a [`Value`] by shape. Resolution
//! mirrors Python name lookup: namespace bindings shadow builtins, and
//! `typing` forms are accepted with or without the `typing.` prefix.

use std::fmt;

use crate::core::namespace::{Namespace, Value};

/// Well-known short aliases that resolve to their package when only the alias is bound.
const PACKAGE_ALIASES: [(&str, &str); 2] = [("pandas", "pd"), ("numpy", "np")];

const BUILTIN_TYPES: [&str; 13] = [
    "int",
    "float",
    "complex",
    "str",
    "bytes",
    "bool",
    "list",
    "dict",
    "tuple",
    "set",
    "frozenset",
    "object",
    "type",
];

const TYPING_FORMS: [&str; 11] = [
    "Any",
    "List",
    "Dict",
    "Tuple",
    "Set",
    "FrozenSet",
    "Optional",
    "Union",
    "Literal",
    "Sequence",
    "Mapping",
];

/// Parsed type expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// Dotted name, e.g. `["pd", "DataFrame"]`.
    Name(Vec<String>),
    Subscript {
        base: Vec<String>,
        args: Vec<TypeExpr>,
    },
    /// `a | b | c`
    Union(Vec<TypeExpr>),
    None,
    Ellipsis,
    Str(String),
    Int(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeExprError(pub String);

impl fmt::Display for TypeExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TypeExprError {}

fn err<T>(message: impl Into<String>) -> Result<T, TypeExprError> {
    Err(TypeExprError(message.into()))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Dot,
    Ellipsis,
    Comma,
    Pipe,
    LBracket,
    RBracket,
    LParen,
    RParen,
}

fn tokenize(text: &str) -> Result<Vec<Token>, TypeExprError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '.' => {
                if chars[i..].starts_with(&['.', '.', '.']) {
                    tokens.push(Token::Ellipsis);
                    i += 3;
                } else {
                    tokens.push(Token::Dot);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return err("unterminated string in type expression"),
                        Some('\\') => {
                            if let Some(next) = chars.get(i + 1) {
                                value.push(*next);
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            value.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                i += 1;
                while chars.get(i).is_some_and(char::is_ascii_digit) {
                    i += 1;
                }
                let digits: String = chars[start..i].iter().collect();
                let value = digits
                    .parse::<i64>()
                    .map_err(|_| TypeExprError(format!("invalid integer literal {digits}")))?;
                tokens.push(Token::Int(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while chars.get(i).is_some_and(|ch| ch.is_alphanumeric() || *ch == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return err(format!("unexpected character {other:?} in type expression")),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), TypeExprError> {
        if self.eat(token) {
            return Ok(());
        }
        err(format!("expected {what} in type expression"))
    }

    fn union(&mut self) -> Result<TypeExpr, TypeExprError> {
        let mut members = vec![self.postfix()?];
        while self.eat(&Token::Pipe) {
            members.push(self.postfix()?);
        }
        if members.len() == 1 {
            return Ok(members.remove(0));
        }
        Ok(TypeExpr::Union(members))
    }

    fn postfix(&mut self) -> Result<TypeExpr, TypeExprError> {
        let atom = self.atom()?;
        if !self.eat(&Token::LBracket) {
            return Ok(atom);
        }
        let TypeExpr::Name(base) = atom else {
            return err("only named types can be subscripted");
        };
        let mut args = Vec::new();
        if !self.eat(&Token::RBracket) {
            loop {
                args.push(self.union()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
                if self.peek() == Some(&Token::RBracket) {
                    break;
                }
            }
            self.expect(&Token::RBracket, "']'")?;
        }
        Ok(TypeExpr::Subscript { base, args })
    }

    fn atom(&mut self) -> Result<TypeExpr, TypeExprError> {
        match self.next() {
            Some(Token::Ident(first)) => {
                if first == "None" {
                    return Ok(TypeExpr::None);
                }
                let mut path = vec![first];
                while self.eat(&Token::Dot) {
                    match self.next() {
                        Some(Token::Ident(part)) => path.push(part),
                        _ => return err("expected attribute name after '.'"),
                    }
                }
                Ok(TypeExpr::Name(path))
            }
            Some(Token::Ellipsis) => Ok(TypeExpr::Ellipsis),
            Some(Token::Str(value)) => Ok(TypeExpr::Str(value)),
            Some(Token::Int(value)) => Ok(TypeExpr::Int(value)),
            Some(Token::LParen) => {
                let inner = self.union()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(other) => err(format!("unexpected token {other:?} in type expression")),
            None => err("empty type expression"),
        }
    }
}

/// Parse type-expression text.
pub fn parse_type_expr(text: &str) -> Result<TypeExpr, TypeExprError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.union()?;
    if parser.peek().is_some() {
        return err(format!("unexpected trailing input in type expression {text:?}"));
    }
    Ok(expr)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Int,
    Float,
    Complex,
    Str,
    Bytes,
    Bool,
    Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TupleShape {
    /// Bare `tuple`: any length, any items.
    Any,
    /// `tuple[T, ...]`
    Variadic(Box<Matcher>),
    /// `tuple[A, B, C]`
    Fixed(Vec<Matcher>),
}

/// Structural check resolved from a [`TypeExpr`].
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    Any,
    NoneType,
    Builtin(Builtin),
    List(Box<Matcher>),
    Set { item: Box<Matcher>, frozen: bool },
    Tuple(TupleShape),
    Dict(Box<Matcher>, Box<Matcher>),
    /// List or tuple whose items all match.
    Sequence(Box<Matcher>),
    Union(Vec<Matcher>),
    Literal(Vec<Value>),
    /// Class bound in the namespace, checked against the value's MRO.
    Class(String),
    /// `package.Name` reached through a module binding; any MRO entry named
    /// `Name` that lives under `package` matches.
    PackageClass { package: String, name: String },
}

/// What a dotted name refers to before subscripts are applied.
enum Resolved {
    Builtin(&'static str),
    Typing(&'static str),
    Class(String),
    PackageClass { package: String, name: String },
}

fn builtin_name(name: &str) -> Option<&'static str> {
    BUILTIN_TYPES.iter().copied().find(|candidate| *candidate == name)
}

fn typing_name(name: &str) -> Option<&'static str> {
    TYPING_FORMS.iter().copied().find(|candidate| *candidate == name)
}

/// Look a root name up, letting `pandas`/`numpy` fall back to `pd`/`np`.
fn lookup_root<'a>(ns: &'a Namespace, name: &str) -> Option<&'a Value> {
    if let Some(value) = ns.get(name) {
        return Some(value);
    }
    PACKAGE_ALIASES
        .iter()
        .find(|(full, _)| *full == name)
        .and_then(|(_, alias)| ns.get(alias))
}

fn top_package(module: &str) -> &str {
    module.split('.').next().unwrap_or(module)
}

fn resolve_path(path: &[String], ns: &Namespace) -> Result<Resolved, TypeExprError> {
    let Some((first, rest)) = path.split_first() else {
        return err("empty type name");
    };
    let dotted = path.join(".");

    match lookup_root(ns, first) {
        Some(Value::Type { qualname }) => {
            if rest.is_empty() {
                return Ok(Resolved::Class(qualname.clone()));
            }
            Ok(Resolved::Class(format!("{qualname}.{}", rest.join("."))))
        }
        Some(Value::Module { name }) => {
            let Some(last) = rest.last() else {
                return err(format!("'{first}' is a module, not a type"));
            };
            if rest.len() == 1 {
                if name == "typing" {
                    if let Some(form) = typing_name(last) {
                        return Ok(Resolved::Typing(form));
                    }
                }
                if name == "builtins" {
                    if let Some(builtin) = builtin_name(last) {
                        return Ok(Resolved::Builtin(builtin));
                    }
                }
            }
            Ok(Resolved::PackageClass {
                package: top_package(name).to_string(),
                name: last.clone(),
            })
        }
        Some(other) => err(format!(
            "'{first}' is bound to a {} value, not a type",
            other.type_name()
        )),
        None => {
            if rest.is_empty() {
                if let Some(builtin) = builtin_name(first) {
                    return Ok(Resolved::Builtin(builtin));
                }
                if let Some(form) = typing_name(first) {
                    return Ok(Resolved::Typing(form));
                }
            } else if first == "typing" && rest.len() == 1 {
                if let Some(form) = typing_name(&rest[0]) {
                    return Ok(Resolved::Typing(form));
                }
            }
            err(format!("name '{dotted}' is not defined"))
        }
    }
}

fn builtin_matcher(name: &str) -> Option<Matcher> {
    let matcher = match name {
        "int" => Matcher::Builtin(Builtin::Int),
        "float" => Matcher::Builtin(Builtin::Float),
        "complex" => Matcher::Builtin(Builtin::Complex),
        "str" => Matcher::Builtin(Builtin::Str),
        "bytes" => Matcher::Builtin(Builtin::Bytes),
        "bool" => Matcher::Builtin(Builtin::Bool),
        "type" => Matcher::Builtin(Builtin::Type),
        "object" | "Any" => Matcher::Any,
        "list" | "List" => Matcher::List(Box::new(Matcher::Any)),
        "dict" | "Dict" | "Mapping" => {
            Matcher::Dict(Box::new(Matcher::Any), Box::new(Matcher::Any))
        }
        "tuple" | "Tuple" => Matcher::Tuple(TupleShape::Any),
        "set" | "Set" => Matcher::Set {
            item: Box::new(Matcher::Any),
            frozen: false,
        },
        "frozenset" | "FrozenSet" => Matcher::Set {
            item: Box::new(Matcher::Any),
            frozen: true,
        },
        "Sequence" => Matcher::Sequence(Box::new(Matcher::Any)),
        _ => return None,
    };
    Some(matcher)
}

fn bare_matcher(resolved: Resolved) -> Result<Matcher, TypeExprError> {
    match resolved {
        Resolved::Builtin(name) | Resolved::Typing(name) => builtin_matcher(name)
            .ok_or_else(|| TypeExprError(format!("'{name}' requires type arguments"))),
        Resolved::Class(qualname) => Ok(class_matcher(qualname)),
        Resolved::PackageClass { package, name } => Ok(Matcher::PackageClass { package, name }),
    }
}

/// Classes bound from `builtins` behave like the builtin names themselves.
fn class_matcher(qualname: String) -> Matcher {
    if let Some(name) = qualname.strip_prefix("builtins.") {
        if let Some(matcher) = builtin_matcher(name) {
            return matcher;
        }
    }
    Matcher::Class(qualname)
}

fn expect_args(name: &str, args: &[Matcher], count: usize) -> Result<(), TypeExprError> {
    if args.len() != count {
        return err(format!(
            "{name}[...] expects {count} type argument(s), got {}",
            args.len()
        ));
    }
    Ok(())
}

fn subscript_matcher(
    resolved: Resolved,
    args: &[TypeExpr],
    ns: &Namespace,
) -> Result<Matcher, TypeExprError> {
    let form = match resolved {
        Resolved::Builtin(name) | Resolved::Typing(name) => name,
        // Generic user classes (`pd.Series[int]`) are checked nominally.
        Resolved::Class(qualname) => return Ok(class_matcher(qualname)),
        Resolved::PackageClass { package, name } => {
            return Ok(Matcher::PackageClass { package, name });
        }
    };

    if form == "Literal" {
        let values = args
            .iter()
            .map(literal_value)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Matcher::Literal(values));
    }

    if matches!(form, "tuple" | "Tuple") {
        return match args {
            [item, TypeExpr::Ellipsis] => Ok(Matcher::Tuple(TupleShape::Variadic(Box::new(
                resolve_expr(item, ns)?,
            )))),
            _ => Ok(Matcher::Tuple(TupleShape::Fixed(
                args.iter()
                    .map(|arg| resolve_expr(arg, ns))
                    .collect::<Result<Vec<_>, _>>()?,
            ))),
        };
    }

    let mut matchers = args
        .iter()
        .map(|arg| resolve_expr(arg, ns))
        .collect::<Result<Vec<_>, _>>()?;

    match form {
        "list" | "List" => {
            expect_args(form, &matchers, 1)?;
            Ok(Matcher::List(Box::new(matchers.remove(0))))
        }
        "set" | "Set" | "frozenset" | "FrozenSet" => {
            expect_args(form, &matchers, 1)?;
            Ok(Matcher::Set {
                item: Box::new(matchers.remove(0)),
                frozen: matches!(form, "frozenset" | "FrozenSet"),
            })
        }
        "dict" | "Dict" | "Mapping" => {
            expect_args(form, &matchers, 2)?;
            let value = matchers.remove(1);
            let key = matchers.remove(0);
            Ok(Matcher::Dict(Box::new(key), Box::new(value)))
        }
        "Sequence" => {
            expect_args(form, &matchers, 1)?;
            Ok(Matcher::Sequence(Box::new(matchers.remove(0))))
        }
        "Optional" => {
            expect_args(form, &matchers, 1)?;
            Ok(Matcher::Union(vec![matchers.remove(0), Matcher::NoneType]))
        }
        "Union" => {
            if matchers.is_empty() {
                return err("Union[...] expects at least one type argument");
            }
            Ok(Matcher::Union(matchers))
        }
        other => err(format!("'{other}' is not subscriptable")),
    }
}

fn literal_value(expr: &TypeExpr) -> Result<Value, TypeExprError> {
    match expr {
        TypeExpr::Str(value) => Ok(Value::str(value.clone())),
        TypeExpr::Int(value) => Ok(Value::int(*value)),
        TypeExpr::None => Ok(Value::None),
        TypeExpr::Name(path) if path.len() == 1 && path[0] == "True" => {
            Ok(Value::Bool { value: true })
        }
        TypeExpr::Name(path) if path.len() == 1 && path[0] == "False" => {
            Ok(Value::Bool { value: false })
        }
        other => err(format!("unsupported Literal argument {other:?}")),
    }
}

fn resolve_expr(expr: &TypeExpr, ns: &Namespace) -> Result<Matcher, TypeExprError> {
    match expr {
        TypeExpr::None => Ok(Matcher::NoneType),
        TypeExpr::Name(path) => bare_matcher(resolve_path(path, ns)?),
        TypeExpr::Subscript { base, args } => subscript_matcher(resolve_path(base, ns)?, args, ns),
        TypeExpr::Union(members) => Ok(Matcher::Union(
            members
                .iter()
                .map(|member| resolve_expr(member, ns))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        TypeExpr::Ellipsis => err("'...' is only valid as the last tuple argument"),
        TypeExpr::Str(_) | TypeExpr::Int(_) => err("literal values are only valid inside Literal[...]"),
    }
}

/// Parse and resolve `text` against `ns`.
pub fn resolve_type(text: &str, ns: &Namespace) -> Result<Matcher, TypeExprError> {
    resolve_expr(&parse_type_expr(text)?, ns)
}

impl Matcher {
    /// Structural check of `value` against this matcher.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::NoneType => matches!(value, Value::None),
            Matcher::Builtin(builtin) => builtin_matches(*builtin, value),
            Matcher::List(item) => match value {
                Value::List { items } => items.iter().all(|v| item.matches(v)),
                other => opaque_instance(other, "builtins.list"),
            },
            Matcher::Set { item, frozen } => match value {
                Value::Set {
                    items,
                    frozen: value_frozen,
                } => value_frozen == frozen && items.iter().all(|v| item.matches(v)),
                other => opaque_instance(
                    other,
                    if *frozen {
                        "builtins.frozenset"
                    } else {
                        "builtins.set"
                    },
                ),
            },
            Matcher::Tuple(shape) => match value {
                Value::Tuple { items } => match shape {
                    TupleShape::Any => true,
                    TupleShape::Variadic(item) => items.iter().all(|v| item.matches(v)),
                    TupleShape::Fixed(parts) => {
                        parts.len() == items.len()
                            && parts.iter().zip(items).all(|(m, v)| m.matches(v))
                    }
                },
                other => opaque_instance(other, "builtins.tuple"),
            },
            Matcher::Dict(key, val) => match value {
                Value::Dict { entries } => entries
                    .iter()
                    .all(|(k, v)| key.matches(k) && val.matches(v)),
                other => opaque_instance(other, "builtins.dict"),
            },
            Matcher::Sequence(item) => match value {
                Value::List { items } | Value::Tuple { items } => {
                    items.iter().all(|v| item.matches(v))
                }
                other => {
                    opaque_instance(other, "builtins.list") || opaque_instance(other, "builtins.tuple")
                }
            },
            Matcher::Union(members) => members.iter().any(|m| m.matches(value)),
            Matcher::Literal(allowed) => allowed.contains(value),
            Matcher::Class(qualname) => value.is_instance_of(qualname),
            Matcher::PackageClass { package, name } => match value {
                Value::Object { mro, .. } => mro.iter().any(|entry| {
                    let (module, class) = entry.rsplit_once('.').unwrap_or(("", entry));
                    class == name && top_package(module) == package
                }),
                _ => false,
            },
        }
    }
}

/// Containers too large or deep to mirror arrive as objects; accept them by class.
fn opaque_instance(value: &Value, qualname: &str) -> bool {
    matches!(value, Value::Object { .. }) && value.is_instance_of(qualname)
}

fn builtin_matches(builtin: Builtin, value: &Value) -> bool {
    match builtin {
        Builtin::Int => matches!(value, Value::Int { .. } | Value::Bool { .. })
            || value.is_instance_of("builtins.int"),
        Builtin::Float => matches!(
            value,
            Value::Float { .. } | Value::Int { .. } | Value::Bool { .. }
        ) || value.is_instance_of("builtins.float")
            || value.is_instance_of("builtins.int"),
        Builtin::Complex => {
            builtin_matches(Builtin::Float, value) || value.is_instance_of("builtins.complex")
        }
        Builtin::Str => value.is_instance_of("builtins.str"),
        Builtin::Bytes => ["builtins.bytes", "builtins.bytearray", "builtins.memoryview"]
            .iter()
            .any(|qualname| value.is_instance_of(qualname)),
        Builtin::Bool => value.is_instance_of("builtins.bool"),
        Builtin::Type => value.is_instance_of("builtins.type"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(text: &str, ns: &Namespace, value: &Value) -> bool {
        resolve_type(text, ns)
            .unwrap_or_else(|e| panic!("resolve {text}: {e}"))
            .matches(value)
    }

    fn list(items: Vec<Value>) -> Value {
        Value::List { items }
    }

    fn dataframe() -> Value {
        Value::Object {
            type_name: "DataFrame".to_string(),
            mro: vec![
                "pandas.core.frame.DataFrame".to_string(),
                "pandas.core.generic.NDFrame".to_string(),
                "builtins.object".to_string(),
            ],
            repr: "empty".to_string(),
        }
    }

    #[test]
    fn parses_nested_generics_and_unions() {
        let expr = parse_type_expr("dict[str, list[int]] | None").expect("parse");
        assert_eq!(
            expr,
            TypeExpr::Union(vec![
                TypeExpr::Subscript {
                    base: vec!["dict".to_string()],
                    args: vec![
                        TypeExpr::Name(vec!["str".to_string()]),
                        TypeExpr::Subscript {
                            base: vec!["list".to_string()],
                            args: vec![TypeExpr::Name(vec!["int".to_string()])],
                        },
                    ],
                },
                TypeExpr::None,
            ])
        );
    }

    #[test]
    fn rejects_malformed_expressions() {
        for text in ["", "list[int", "dict[str,, int]", "int]", "pd.", "list[int] extra"] {
            assert!(parse_type_expr(text).is_err(), "{text:?} should not parse");
        }
    }

    #[test]
    fn primitives_follow_numeric_tower() {
        let ns = Namespace::new();
        let flag = Value::Bool { value: true };
        assert!(check("int", &ns, &Value::int(4)));
        assert!(check("int", &ns, &flag));
        assert!(!check("int", &ns, &Value::Float { value: 1.5 }));
        assert!(check("float", &ns, &Value::int(4)));
        assert!(check("float", &ns, &Value::Float { value: 1.5 }));
        assert!(!check("bool", &ns, &Value::int(1)));
        assert!(check("str", &ns, &Value::str("x")));
        assert!(!check("str", &ns, &Value::int(1)));
    }

    #[test]
    fn containers_check_every_element() {
        let ns = Namespace::new();
        let ints = list(vec![Value::int(1), Value::int(2)]);
        let mixed = list(vec![Value::int(1), Value::str("two")]);
        assert!(check("list[int]", &ns, &ints));
        assert!(!check("list[int]", &ns, &mixed));
        assert!(check("list", &ns, &mixed));
        assert!(check("List[int | str]", &ns, &mixed));

        let records = list(vec![Value::Dict {
            entries: vec![(Value::str("a"), Value::int(1))],
        }]);
        assert!(check("list[dict[str, int]]", &ns, &records));
        assert!(!check("list[dict[str, str]]", &ns, &records));
    }

    #[test]
    fn tuples_fixed_and_variadic() {
        let ns = Namespace::new();
        let pair = Value::Tuple {
            items: vec![Value::str("a"), Value::int(1)],
        };
        assert!(check("tuple[str, int]", &ns, &pair));
        assert!(!check("tuple[str, int, int]", &ns, &pair));
        assert!(!check("tuple[int, ...]", &ns, &pair));
        assert!(check("Tuple[str | int, ...]", &ns, &pair));
        assert!(check("tuple", &ns, &pair));
    }

    #[test]
    fn optional_union_and_literal() {
        let ns = Namespace::new();
        assert!(check("Optional[int]", &ns, &Value::None));
        assert!(check("typing.Optional[int]", &ns, &Value::int(3)));
        assert!(check("Union[int, str]", &ns, &Value::str("x")));
        assert!(check("Literal['a', 'b']", &ns, &Value::str("b")));
        assert!(!check("Literal['a', 'b']", &ns, &Value::str("c")));
        assert!(!check("Literal[1]", &ns, &Value::Bool { value: true }));
    }

    #[test]
    fn any_and_object_accept_everything() {
        let ns = Namespace::new();
        assert!(check("Any", &ns, &Value::None));
        assert!(check("object", &ns, &dataframe()));
    }

    /// `pandas.DataFrame` resolves through `pd` when only the alias is bound.
    #[test]
    fn package_aliases_resolve_through_short_names() {
        let mut ns = Namespace::new();
        ns.insert(
            "pd",
            Value::Module {
                name: "pandas".to_string(),
            },
        );
        assert!(check("pd.DataFrame", &ns, &dataframe()));
        assert!(check("pandas.DataFrame", &ns, &dataframe()));
        assert!(!check("pd.Series", &ns, &dataframe()));
        assert!(!check("pd.DataFrame", &ns, &list(Vec::new())));
    }

    #[test]
    fn unbound_module_name_fails_to_resolve() {
        let ns = Namespace::new();
        let error = resolve_type("pd.DataFrame", &ns).expect_err("pd is unbound");
        assert!(error.to_string().contains("not defined"));
    }

    #[test]
    fn classes_bound_in_namespace_match_by_mro() {
        let mut ns = Namespace::new();
        ns.insert(
            "NDFrame",
            Value::Type {
                qualname: "pandas.core.generic.NDFrame".to_string(),
            },
        );
        assert!(check("NDFrame", &ns, &dataframe()));
        assert!(!check("NDFrame", &ns, &Value::int(1)));
    }

    #[test]
    fn namespace_bindings_shadow_builtins() {
        let mut ns = Namespace::new();
        ns.insert("list", list(vec![Value::int(1)]));
        let error = resolve_type("list[int]", &ns).expect_err("list is shadowed");
        assert!(error.to_string().contains("not a type"));
    }

    #[test]
    fn opaque_containers_match_their_class() {
        let ns = Namespace::new();
        let big_list = Value::Object {
            type_name: "list".to_string(),
            mro: vec!["builtins.list".to_string(), "builtins.object".to_string()],
            repr: "[0, 1, 2, ...]".to_string(),
        };
        assert!(check("list[int]", &ns, &big_list));
        assert!(!check("dict[str, int]", &ns, &big_list));
    }

    #[test]
    fn arity_errors_are_reported() {
        let ns = Namespace::new();
        assert!(resolve_type("dict[str]", &ns).is_err());
        assert!(resolve_type("int[str]", &ns).is_err());
        assert!(resolve_type("Optional", &ns).is_err());
    }
}
