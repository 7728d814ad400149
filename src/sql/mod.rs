//! SQL emission.
//!
//! Every fitted abstract feature translates back into one dialect-independent
//! CREATE TABLE … AS SELECT statement over the staging tables. The engine
//! supplies the features and schemas; an injected [`SqlDialect`] renders the
//! dialect-specific pieces (identifier quoting, aggregate spellings, row
//! numbering). [`HumanReadableSql`] is the default generator used for
//! display and for the SQL-fidelity tests.

use crate::engine::feature::{AbstractFeature, AggKind, Condition, DataUsed};
use crate::engine::FeatureEngine;
use crate::error::Result;
use crate::frame::{StringEncoding, TableSchema};
use crate::placeholder::JoinEdge;

/// Renders the dialect-specific pieces of a feature statement.
pub trait SqlDialect: Send + Sync {
    /// Quote an identifier.
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// The staging-table name of a frame. Index 0 is the population; join
    /// edge `i` maps to index `i + 1`.
    fn staging_table(&self, name: &str, index: usize) -> String {
        let sanitized: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{sanitized}__STAGING_TABLE_{}", index + 1)
    }

    /// The per-population-row numbering expression for a table alias.
    fn rownum(&self, alias: &str) -> String {
        format!("{alias}.\"rownum\"")
    }

    /// Render one aggregate over the prepared expressions.
    fn aggregation(&self, kind: AggKind, expr: &AggExpr<'_>) -> String;
}

/// The expressions an aggregate may reference.
pub struct AggExpr<'a> {
    /// The value to aggregate (empty for COUNT).
    pub value: &'a str,
    /// The peripheral time-stamp expression, when the edge has one.
    pub peripheral_ts: Option<&'a str>,
    /// The population time-stamp expression, when the edge has one.
    pub population_ts: Option<&'a str>,
}

/// The default, human-readable generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct HumanReadableSql;

impl SqlDialect for HumanReadableSql {
    fn aggregation(&self, kind: AggKind, expr: &AggExpr<'_>) -> String {
        let value = expr.value;
        let ts = expr.peripheral_ts.unwrap_or("NULL");
        match kind {
            AggKind::Count => "COUNT(*)".to_string(),
            AggKind::CountDistinct => format!("COUNT(DISTINCT {value})"),
            AggKind::CountMinusCountDistinct => {
                format!("COUNT({value}) - COUNT(DISTINCT {value})")
            }
            AggKind::Avg => format!("AVG({value})"),
            AggKind::Sum => format!("SUM({value})"),
            AggKind::Min => format!("MIN({value})"),
            AggKind::Max => format!("MAX({value})"),
            AggKind::Median => format!("MEDIAN({value})"),
            AggKind::Stddev => format!("STDDEV({value})"),
            AggKind::Var => format!("VARIANCE({value})"),
            AggKind::Skewness => format!("SKEWNESS({value})"),
            AggKind::First => format!("FIRST({value} ORDER BY {ts})"),
            AggKind::Last => format!("LAST({value} ORDER BY {ts})"),
            AggKind::AvgTimeBetween => {
                format!("( MAX({ts}) - MIN({ts}) ) / NULLIF( COUNT({ts}) - 1, 0 )")
            }
            AggKind::Trend => {
                let pop_ts = expr.population_ts.unwrap_or("NULL");
                format!("TREND({value}, {ts}, {pop_ts})")
            }
        }
    }
}

impl FeatureEngine {
    /// Emit one SQL statement per selected feature, child engines first.
    ///
    /// `categories` resolves literal category ids back to their strings;
    /// unresolvable ids render as their numeric value.
    pub fn to_sql(
        &self,
        dialect: &dyn SqlDialect,
        categories: &StringEncoding,
    ) -> Result<Vec<String>> {
        self.to_sql_with_prefix(dialect, categories, "")
    }

    fn to_sql_with_prefix(
        &self,
        dialect: &dyn SqlDialect,
        categories: &StringEncoding,
        prefix: &str,
    ) -> Result<Vec<String>> {
        let mut statements = Vec::new();

        for (i, sub) in self.subengines()?.iter().enumerate() {
            if let Some(subengine) = sub {
                let child_prefix = format!("{prefix}{}_", i + 1);
                statements.extend(subengine.to_sql_with_prefix(
                    dialect,
                    categories,
                    &child_prefix,
                )?);
            }
        }

        let features = self.features()?;
        let population_schema = self.population_schema()?;
        let edge_schemas = self.edge_peripheral_schemas()?;
        let root = self.tree().node(self.tree().root());

        for (i, feature) in features.iter().enumerate() {
            let edge = &root.children[feature.peripheral];
            let input_schema = &edge_schemas[feature.peripheral];
            let name = format!("feature_{prefix}{}", i + 1);
            statements.push(feature_to_sql(
                dialect,
                categories,
                feature,
                &name,
                prefix,
                population_schema,
                input_schema,
                edge,
            ));
        }

        Ok(statements)
    }
}

/// Render one feature as `DROP TABLE …; CREATE TABLE … AS SELECT …`.
#[allow(clippy::too_many_arguments)]
fn feature_to_sql(
    dialect: &dyn SqlDialect,
    categories: &StringEncoding,
    feature: &AbstractFeature,
    name: &str,
    prefix: &str,
    output_schema: &TableSchema,
    input_schema: &TableSchema,
    edge: &JoinEdge,
) -> String {
    let table = dialect.quote_ident(&name.to_uppercase());
    let pop_table = dialect.staging_table(&output_schema.name, 0);
    let peri_table = dialect.staging_table(&input_schema.name, feature.peripheral + 1);

    let value = value_expr(dialect, categories, feature, prefix, output_schema, input_schema);
    let peri_ts = edge
        .other_time_stamp
        .as_deref()
        .or_else(|| input_schema.time_stamps.first().map(|c| c.name.as_str()))
        .map(|c| format!("t2.{}", dialect.quote_ident(c)));
    let pop_ts = edge
        .time_stamp
        .as_deref()
        .or_else(|| output_schema.time_stamps.first().map(|c| c.name.as_str()))
        .map(|c| format!("t1.{}", dialect.quote_ident(c)));

    let agg = dialect.aggregation(
        feature.aggregation,
        &AggExpr {
            value: &value,
            peripheral_ts: peri_ts.as_deref(),
            population_ts: pop_ts.as_deref(),
        },
    );

    let mut sql = String::new();
    sql.push_str(&format!("DROP TABLE IF EXISTS {table};\n\n"));
    sql.push_str(&format!("CREATE TABLE {table} AS\n"));
    sql.push_str(&format!(
        "SELECT COALESCE( {agg}, 0.0 ) AS {},\n",
        dialect.quote_ident(name)
    ));
    sql.push_str(&format!("       {} AS {}\n", dialect.rownum("t1"), dialect.quote_ident("rownum")));
    sql.push_str(&format!("FROM {} t1\n", dialect.quote_ident(&pop_table)));
    sql.push_str(&format!("LEFT JOIN {} t2\n", dialect.quote_ident(&peri_table)));

    if edge.join_key.is_empty() {
        sql.push_str("ON 1 = 1\n");
    } else {
        let on: Vec<String> = edge
            .join_key
            .iter()
            .zip(edge.other_join_key.iter())
            .map(|(pop, peri)| {
                format!(
                    "t1.{} = t2.{}",
                    dialect.quote_ident(pop),
                    dialect.quote_ident(peri)
                )
            })
            .collect();
        sql.push_str(&format!("ON {}\n", on.join(" AND ")));
    }

    if let Some(join) = subfeature_join(dialect, feature, prefix) {
        sql.push_str(&join);
    }

    let mut wheres: Vec<String> = Vec::new();
    if let (Some(pop_ts), Some(peri_ts)) = (&pop_ts, &peri_ts)
        && edge.time_stamp.is_some()
    {
        let op = if edge.allow_lagged_targets { "<" } else { "<=" };
        wheres.push(format!("{peri_ts} {op} {pop_ts}"));
        if let Some(upper) = &edge.upper_time_stamp {
            wheres.push(format!(
                "{peri_ts} < t1.{}",
                dialect.quote_ident(upper)
            ));
        }
    }
    for condition in &feature.conditions {
        wheres.push(condition_expr(
            dialect,
            categories,
            condition,
            output_schema,
            input_schema,
        ));
    }
    if !wheres.is_empty() {
        sql.push_str(&format!("WHERE {}\n", wheres.join("\nAND ")));
    }

    sql.push_str(&format!("GROUP BY {};", dialect.rownum("t1")));
    sql
}

/// The aggregated value expression of a feature.
fn value_expr(
    dialect: &dyn SqlDialect,
    categories: &StringEncoding,
    feature: &AbstractFeature,
    prefix: &str,
    output_schema: &TableSchema,
    input_schema: &TableSchema,
) -> String {
    let t2 = |name: &str| format!("t2.{}", dialect.quote_ident(name));
    let t1 = |name: &str| format!("t1.{}", dialect.quote_ident(name));

    match feature.data_used {
        DataUsed::Numerical => t2(&input_schema.numericals[feature.input_col].name),
        DataUsed::Discrete => t2(&input_schema.discretes[feature.input_col].name),
        DataUsed::Categorical => {
            let col = t2(&input_schema.categoricals[feature.input_col].name);
            match feature.category {
                Some(category) => {
                    let literal = match categories.get(category) {
                        Some(s) => format!("'{}'", s.replace('\'', "''")),
                        None => category.to_string(),
                    };
                    format!("CASE WHEN {col} = {literal} THEN 1 ELSE 0 END")
                }
                None => col,
            }
        }
        DataUsed::SameUnitsCategorical => {
            let out = t1(&output_schema.categoricals[feature.output_col.unwrap_or(0)].name);
            let inp = t2(&input_schema.categoricals[feature.input_col].name);
            format!("CASE WHEN {out} = {inp} THEN 1 ELSE 0 END")
        }
        DataUsed::SameUnitsNumerical | DataUsed::SameUnitsNumericalTs => {
            let out = t1(&output_schema.numericals[feature.output_col.unwrap_or(0)].name);
            let inp = t2(&input_schema.numericals[feature.input_col].name);
            format!("{out} - {inp}")
        }
        DataUsed::SameUnitsDiscrete | DataUsed::SameUnitsDiscreteTs => {
            let out = t1(&output_schema.discretes[feature.output_col.unwrap_or(0)].name);
            let inp = t2(&input_schema.discretes[feature.input_col].name);
            format!("{out} - {inp}")
        }
        DataUsed::Subfeatures => format!(
            "sub.{}",
            dialect.quote_ident(&subfeature_name(feature, prefix))
        ),
        DataUsed::NotApplicable => String::new(),
    }
}

/// The child feature name a subfeature aggregation reads.
fn subfeature_name(feature: &AbstractFeature, prefix: &str) -> String {
    format!(
        "feature_{prefix}{}_{}",
        feature.peripheral + 1,
        feature.input_col + 1
    )
}

/// The extra join pulling in the child feature table.
fn subfeature_join(
    dialect: &dyn SqlDialect,
    feature: &AbstractFeature,
    prefix: &str,
) -> Option<String> {
    if feature.data_used != DataUsed::Subfeatures {
        return None;
    }
    let name = subfeature_name(feature, prefix);
    Some(format!(
        "LEFT JOIN {} sub\nON sub.{} = {}\n",
        dialect.quote_ident(&name.to_uppercase()),
        dialect.quote_ident("rownum"),
        dialect.rownum("t2"),
    ))
}

fn condition_expr(
    dialect: &dyn SqlDialect,
    categories: &StringEncoding,
    condition: &Condition,
    output_schema: &TableSchema,
    input_schema: &TableSchema,
) -> String {
    match *condition {
        Condition::CategoryEqual {
            input_col,
            category,
            ..
        } => {
            let col = dialect.quote_ident(&input_schema.categoricals[input_col].name);
            match categories.get(category) {
                Some(s) => format!("t2.{col} = '{}'", s.replace('\'', "''")),
                None => format!("t2.{col} = {category}"),
            }
        }
        Condition::SameUnitsCategorical {
            input_col,
            output_col,
            ..
        } => {
            let out = dialect.quote_ident(&output_schema.categoricals[output_col].name);
            let inp = dialect.quote_ident(&input_schema.categoricals[input_col].name);
            format!("t1.{out} = t2.{inp}")
        }
        Condition::LagWindow { lower, upper, .. } => {
            let peri = input_schema
                .time_stamps
                .first()
                .map(|c| c.name.as_str())
                .unwrap_or("ts");
            let pop = output_schema
                .time_stamps
                .first()
                .map(|c| c.name.as_str())
                .unwrap_or("ts");
            let peri = format!("t2.{}", dialect.quote_ident(peri));
            let pop = format!("t1.{}", dialect.quote_ident(pop));
            format!("{peri} + {lower} <= {pop} AND {pop} < {peri} + {upper}")
        }
    }
}
