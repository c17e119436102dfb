use sqlparser::ast::{Expr, Ident, ObjectName, ObjectNamePart};

/// Identifier value of an ObjectName part, or its SQL text for function parts.
fn object_name_part_value(part: &ObjectNamePart) -> String {
    part.as_ident()
        .map(|ident| ident.value.clone())
        .unwrap_or_else(|| part.to_string())
}

/// Normalized identifier: unquoted and lower-cased.
///
/// Quoted identifiers keep embedded dots; only the case is folded.
pub(crate) fn ident_name(ident: &Ident) -> String {
    ident.value.to_lowercase()
}

/// Normalized dotted name of an ObjectName, e.g. `"Sales".Orders` → `sales.orders`.
pub(crate) fn object_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|part| object_name_part_value(part).to_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}

/// Last part of an ObjectName, normalized.
pub(crate) fn simple_object_name(name: &ObjectName) -> String {
    name.0
        .last()
        .map(|part| object_name_part_value(part).to_lowercase())
        .unwrap_or_default()
}

/// Name a database would give an unaliased SELECT item.
///
/// Column references keep their column name, function calls take the function
/// name (`COUNT(o.id)` → `count`) and CASE expressions are called `case`.
pub(crate) fn default_output_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident_name(ident),
        Expr::CompoundIdentifier(parts) => parts.last().map(ident_name).unwrap_or_default(),
        Expr::Nested(inner) | Expr::Cast { expr: inner, .. } => default_output_name(inner),
        Expr::Function(function) => simple_object_name(&function.name),
        Expr::Case { .. } => "case".to_string(),
        other => other.to_string().to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn expr(sql: &str) -> Expr {
        Parser::new(&GenericDialect {})
            .try_with_sql(sql)
            .unwrap()
            .parse_expr()
            .unwrap()
    }

    #[test]
    fn output_names_follow_database_conventions() {
        assert_eq!(default_output_name(&expr("o.Customer_Id")), "customer_id");
        assert_eq!(default_output_name(&expr("COUNT(o.id)")), "count");
        assert_eq!(default_output_name(&expr("CAST(total AS INT)")), "total");
        assert_eq!(
            default_output_name(&expr("CASE WHEN a THEN 1 END")),
            "case"
        );
        assert_eq!(default_output_name(&expr("a + b")), "a + b");
    }

    #[test]
    fn object_names_are_lowercased_and_unquoted() {
        let name = Parser::new(&GenericDialect {})
            .try_with_sql("\"Sales\".Orders")
            .unwrap()
            .parse_object_name(false)
            .unwrap();
        assert_eq!(object_name(&name), "sales.orders");
        assert_eq!(simple_object_name(&name), "orders");
    }
}
