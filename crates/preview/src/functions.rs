//! functions available to expressions
//!
//! Only the handful of built-ins templates commonly use to shape parameter values.
use hcl::eval::{Context, FuncArgs, FuncDef, ParamType};
use hcl::Value;

pub fn declare(ctx: &mut Context<'_>) {
    ctx.declare_func("lower", unary(ParamType::String, lower));
    ctx.declare_func("upper", unary(ParamType::String, upper));
    ctx.declare_func("trimspace", unary(ParamType::String, trimspace));
    ctx.declare_func("length", unary(ParamType::Any, length));
    ctx.declare_func("tostring", unary(ParamType::Any, tostring));
    ctx.declare_func("tonumber", unary(ParamType::Any, tonumber));
    ctx.declare_func("tolist", unary(array_of_any(), tolist));
    ctx.declare_func("jsonencode", unary(ParamType::Any, jsonencode));
    ctx.declare_func(
        "join",
        FuncDef::builder()
            .param(ParamType::String)
            .param(ParamType::Array(Box::new(ParamType::Any)))
            .build(join),
    );
    ctx.declare_func(
        "contains",
        FuncDef::builder()
            .param(array_of_any())
            .param(ParamType::Any)
            .build(contains),
    );
}

fn unary(param: ParamType, func: fn(FuncArgs) -> Result<Value, String>) -> FuncDef {
    FuncDef::builder().param(param).build(func)
}

fn array_of_any() -> ParamType {
    ParamType::Array(Box::new(ParamType::Any))
}

fn string_arg(args: &FuncArgs, index: usize) -> Result<&str, String> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("argument {index} must be a string"))
}

fn lower(args: FuncArgs) -> Result<Value, String> {
    Ok(string_arg(&args, 0)?.to_lowercase().into())
}

fn upper(args: FuncArgs) -> Result<Value, String> {
    Ok(string_arg(&args, 0)?.to_uppercase().into())
}

fn trimspace(args: FuncArgs) -> Result<Value, String> {
    Ok(string_arg(&args, 0)?.trim().into())
}

fn length(args: FuncArgs) -> Result<Value, String> {
    let len = match args.first() {
        Some(Value::String(s)) => s.chars().count(),
        Some(Value::Array(a)) => a.len(),
        Some(Value::Object(o)) => o.len(),
        Some(other) => return Err(format!("cannot take the length of {other:?}")),
        None => return Err("missing argument".to_string()),
    };
    Ok(Value::Number((len as u64).into()))
}

fn tostring(args: FuncArgs) -> Result<Value, String> {
    match args.first() {
        Some(Value::String(s)) => Ok(Value::String(s.clone())),
        Some(Value::Number(n)) => Ok(Value::String(n.to_string())),
        Some(Value::Bool(b)) => Ok(Value::String(b.to_string())),
        Some(Value::Null) => Ok(Value::Null),
        _ => Err("only primitive values can be converted to string".to_string()),
    }
}

fn tonumber(args: FuncArgs) -> Result<Value, String> {
    match args.first() {
        Some(Value::Number(n)) => Ok(Value::Number(n.clone())),
        Some(Value::Null) => Ok(Value::Null),
        Some(Value::String(s)) => {
            if let Ok(int) = s.trim().parse::<i64>() {
                return Ok(Value::Number(int.into()));
            }
            s.trim()
                .parse::<f64>()
                .ok()
                .and_then(hcl::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("cannot convert {s:?} to number"))
        }
        _ => Err("cannot convert value to number".to_string()),
    }
}

fn tolist(args: FuncArgs) -> Result<Value, String> {
    args.first()
        .cloned()
        .ok_or_else(|| "missing argument".to_string())
}

fn jsonencode(args: FuncArgs) -> Result<Value, String> {
    let value = args.first().ok_or_else(|| "missing argument".to_string())?;
    serde_json::to_string(value)
        .map(Value::String)
        .map_err(|err| err.to_string())
}

fn join(args: FuncArgs) -> Result<Value, String> {
    let separator = string_arg(&args, 0)?;
    let elements = args
        .get(1)
        .and_then(Value::as_array)
        .ok_or_else(|| "argument 1 must be a list".to_string())?;

    let parts = elements
        .iter()
        .map(|element| match element {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(format!("cannot join {other:?}")),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(parts.join(separator).into())
}

fn contains(args: FuncArgs) -> Result<Value, String> {
    let elements = args
        .first()
        .and_then(Value::as_array)
        .ok_or_else(|| "argument 0 must be a list".to_string())?;
    let needle = args.get(1).ok_or_else(|| "missing argument".to_string())?;
    Ok(Value::Bool(elements.contains(needle)))
}

#[cfg(test)]
mod test {
    use crate::value::Value;
    use hcl::eval::Evaluate;
    use pretty_assertions::assert_eq;

    fn eval(source: &str) -> Value {
        let mut ctx = hcl::eval::Context::new();
        super::declare(&mut ctx);
        let expr: hcl_edit::expr::Expression = source.parse().expect("valid expression");
        let expr: hcl::Expression = expr.into();
        expr.evaluate(&ctx).expect("evaluates").into()
    }

    #[test]
    fn string_functions() {
        assert_eq!(eval(r#"lower("EU-West")"#), Value::from("eu-west"));
        assert_eq!(eval(r#"upper("eu")"#), Value::from("EU"));
        assert_eq!(eval(r#"trimspace("  x ")"#), Value::from("x"));
        assert_eq!(eval(r#"join("-", ["a", 1, true])"#), Value::from("a-1-true"));
    }

    #[test]
    fn conversions() {
        assert_eq!(eval(r#"tonumber("42")"#), Value::from(42));
        assert_eq!(eval("tostring(3)"), Value::from("3"));
        assert_eq!(eval(r#"jsonencode(["a", "b"])"#), Value::from(r#"["a","b"]"#));
    }

    #[test]
    fn collections() {
        assert_eq!(eval(r#"length(["a", "b"])"#), Value::from(2));
        assert_eq!(eval(r#"length("abc")"#), Value::from(3));
        assert_eq!(eval(r#"contains(["a", "b"], "b")"#), Value::from(true));
    }
}
