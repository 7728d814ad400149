//! Abstract features: the symbolic description of one candidate feature.
//!
//! An [`AbstractFeature`] is produced during enumeration, filtered by the
//! selector, stored in the fitted engine, and consumed at transform and at
//! SQL emission. It is immutable once constructed.

use serde::{Deserialize, Serialize};

/// The aggregation applied over the matched peripheral rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggKind {
    Count,
    CountDistinct,
    CountMinusCountDistinct,
    Avg,
    Sum,
    Min,
    Max,
    Median,
    Stddev,
    Var,
    Skewness,
    First,
    Last,
    AvgTimeBetween,
    Trend,
}

impl AggKind {
    /// Every supported aggregation, in enumeration order.
    pub fn all() -> &'static [AggKind] {
        use AggKind::*;
        &[
            Count,
            CountDistinct,
            CountMinusCountDistinct,
            Avg,
            Sum,
            Min,
            Max,
            Median,
            Stddev,
            Var,
            Skewness,
            First,
            Last,
            AvgTimeBetween,
            Trend,
        ]
    }

    /// Whether the aggregation applies to numerical and discrete columns.
    ///
    /// COUNT and AVG TIME BETWEEN take no input column (they are emitted
    /// per table); the two distinct-count kinds are categorical only.
    pub fn is_numerical(&self) -> bool {
        !matches!(
            self,
            AggKind::Count
                | AggKind::CountDistinct
                | AggKind::CountMinusCountDistinct
                | AggKind::AvgTimeBetween
        )
    }

    /// Whether the aggregation applies to categorical columns.
    pub fn is_categorical(&self) -> bool {
        matches!(self, AggKind::CountDistinct | AggKind::CountMinusCountDistinct)
    }

    /// FIRST and LAST need time stamps on both sides of the join.
    pub fn is_first_last(&self) -> bool {
        matches!(self, AggKind::First | AggKind::Last)
    }

    /// Kinds whose incremental state walks neighbors and therefore require
    /// the match slice to be sorted by (output row, value).
    pub fn needs_sorting(&self) -> bool {
        matches!(
            self,
            AggKind::Min
                | AggKind::Max
                | AggKind::Median
                | AggKind::CountDistinct
                | AggKind::CountMinusCountDistinct
        )
    }

    /// Kinds evaluated by a one-shot kernel over (time stamp, value) pairs
    /// rather than by the incremental state machine.
    pub fn is_time_based(&self) -> bool {
        matches!(
            self,
            AggKind::First | AggKind::Last | AggKind::AvgTimeBetween | AggKind::Trend
        )
    }

    /// The canonical name, as accepted in hyperparameters and emitted in SQL.
    pub fn name(&self) -> &'static str {
        match self {
            AggKind::Count => "COUNT",
            AggKind::CountDistinct => "COUNT DISTINCT",
            AggKind::CountMinusCountDistinct => "COUNT MINUS COUNT DISTINCT",
            AggKind::Avg => "AVG",
            AggKind::Sum => "SUM",
            AggKind::Min => "MIN",
            AggKind::Max => "MAX",
            AggKind::Median => "MEDIAN",
            AggKind::Stddev => "STDDEV",
            AggKind::Var => "VAR",
            AggKind::Skewness => "SKEWNESS",
            AggKind::First => "FIRST",
            AggKind::Last => "LAST",
            AggKind::AvgTimeBetween => "AVG TIME BETWEEN",
            AggKind::Trend => "TREND",
        }
    }
}

impl std::fmt::Display for AggKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which column family on either side of the join supplies the aggregated
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataUsed {
    /// A peripheral categorical column (distinct counts, or a category
    /// indicator when the feature carries a literal category).
    Categorical,
    /// A peripheral discrete column.
    Discrete,
    /// A peripheral numerical column.
    Numerical,
    /// Same-unit categorical pair: value is the equality indicator between
    /// the population and peripheral columns.
    SameUnitsCategorical,
    /// Same-unit discrete pair: value is the population-minus-peripheral
    /// difference.
    SameUnitsDiscrete,
    /// Like `SameUnitsDiscrete` where the population column is a time stamp.
    SameUnitsDiscreteTs,
    /// Same-unit numerical pair: population-minus-peripheral difference.
    SameUnitsNumerical,
    /// Like `SameUnitsNumerical` where the population column is a time stamp.
    SameUnitsNumericalTs,
    /// A column of the child engine's output matrix.
    Subfeatures,
    /// No input column (COUNT, AVG TIME BETWEEN).
    NotApplicable,
}

impl DataUsed {
    /// Whether the value compares a population column against a peripheral
    /// column (importance credit is split between the two).
    pub fn is_same_units(&self) -> bool {
        matches!(
            self,
            DataUsed::SameUnitsCategorical
                | DataUsed::SameUnitsDiscrete
                | DataUsed::SameUnitsDiscreteTs
                | DataUsed::SameUnitsNumerical
                | DataUsed::SameUnitsNumericalTs
        )
    }
}

/// One filter predicate over a match.
///
/// Conditions carry the join-edge index they were generated for; the
/// enumerator only attaches conditions whose edge matches the feature's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Peripheral categorical column equals a literal category.
    CategoryEqual {
        peripheral: usize,
        input_col: usize,
        category: i64,
    },
    /// Population categorical column equals the peripheral categorical
    /// column (same unit on both sides).
    SameUnitsCategorical {
        peripheral: usize,
        input_col: usize,
        output_col: usize,
    },
    /// Population time stamp falls in `(peripheral_ts + lower,
    /// peripheral_ts + upper]`.
    LagWindow {
        peripheral: usize,
        lower: f64,
        upper: f64,
    },
}

impl Condition {
    /// The join-edge index the condition belongs to.
    pub fn peripheral(&self) -> usize {
        match self {
            Condition::CategoryEqual { peripheral, .. }
            | Condition::SameUnitsCategorical { peripheral, .. }
            | Condition::LagWindow { peripheral, .. } => *peripheral,
        }
    }
}

/// The symbolic description of one candidate feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstractFeature {
    /// The aggregation applied over the matches.
    pub aggregation: AggKind,
    /// Index of the join edge (and with it the peripheral table) the
    /// feature aggregates over.
    pub peripheral: usize,
    /// Which column family supplies the aggregated value.
    pub data_used: DataUsed,
    /// Input column index within the family on the peripheral side.
    /// Unused (0) for `DataUsed::NotApplicable`.
    pub input_col: usize,
    /// Population-side column index for same-unit comparisons.
    pub output_col: Option<usize>,
    /// Literal category for category-sliced aggregates: the value becomes
    /// the indicator `peripheral[input_col] == category`.
    pub category: Option<i64>,
    /// Conditions a match must pass to enter the aggregation.
    pub conditions: Vec<Condition>,
}

impl AbstractFeature {
    /// A plain feature over a peripheral column family.
    pub fn new(
        aggregation: AggKind,
        peripheral: usize,
        data_used: DataUsed,
        input_col: usize,
        conditions: Vec<Condition>,
    ) -> Self {
        Self {
            aggregation,
            peripheral,
            data_used,
            input_col,
            output_col: None,
            category: None,
            conditions,
        }
    }

    /// A same-unit comparison feature.
    pub fn same_units(
        aggregation: AggKind,
        peripheral: usize,
        data_used: DataUsed,
        input_col: usize,
        output_col: usize,
        conditions: Vec<Condition>,
    ) -> Self {
        Self {
            aggregation,
            peripheral,
            data_used,
            input_col,
            output_col: Some(output_col),
            category: None,
            conditions,
        }
    }

    /// A category-sliced feature: aggregates the indicator
    /// `peripheral[input_col] == category`.
    pub fn category_sliced(
        aggregation: AggKind,
        peripheral: usize,
        input_col: usize,
        category: i64,
        conditions: Vec<Condition>,
    ) -> Self {
        Self {
            aggregation,
            peripheral,
            data_used: DataUsed::Categorical,
            input_col,
            output_col: None,
            category: Some(category),
            conditions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numerical_categorical_partition() {
        assert!(AggKind::Avg.is_numerical());
        assert!(AggKind::Trend.is_numerical());
        assert!(AggKind::First.is_numerical());
        assert!(!AggKind::Count.is_numerical());
        assert!(!AggKind::AvgTimeBetween.is_numerical());
        assert!(!AggKind::CountDistinct.is_numerical());

        assert!(AggKind::CountDistinct.is_categorical());
        assert!(AggKind::CountMinusCountDistinct.is_categorical());
        assert!(!AggKind::Sum.is_categorical());
    }

    #[test]
    fn test_sorting_kinds() {
        for kind in [
            AggKind::Min,
            AggKind::Max,
            AggKind::Median,
            AggKind::CountDistinct,
            AggKind::CountMinusCountDistinct,
        ] {
            assert!(kind.needs_sorting(), "{kind} should need sorting");
        }
        assert!(!AggKind::Sum.needs_sorting());
        assert!(!AggKind::Count.needs_sorting());
    }

    #[test]
    fn test_serde_roundtrip() {
        let feature = AbstractFeature::category_sliced(
            AggKind::Avg,
            1,
            2,
            7,
            vec![Condition::LagWindow {
                peripheral: 1,
                lower: 0.0,
                upper: 3600.0,
            }],
        );
        let json = serde_json::to_string(&feature).unwrap();
        let back: AbstractFeature = serde_json::from_str(&json).unwrap();
        assert_eq!(feature, back);
    }

    #[test]
    fn test_agg_kind_names() {
        assert_eq!(AggKind::CountMinusCountDistinct.name(), "COUNT MINUS COUNT DISTINCT");
        assert_eq!(AggKind::AvgTimeBetween.to_string(), "AVG TIME BETWEEN");
    }
}
