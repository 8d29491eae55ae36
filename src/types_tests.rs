//! Tests for core types

#[cfg(test)]
mod tests {
    use super::super::types::*;
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_feature_set_canonical_order() {
        let set = FeatureSet::new([
            Feature::GarchVol,
            Feature::OvernightDrift,
            Feature::Ma5,
            Feature::OvernightDrift,
        ]);
        assert_eq!(
            set.features(),
            &[Feature::OvernightDrift, Feature::Ma5, Feature::GarchVol]
        );
        assert_eq!(set.index_of(Feature::Ma5), Some(1));
        assert_eq!(set.index_of(Feature::DeltaVix), None);
    }

    #[test]
    fn test_feature_set_without() {
        let set = FeatureSet::all().without(Feature::DeltaVix);
        assert_eq!(set.len(), Feature::ALL.len() - 1);
        assert!(!set.contains(Feature::DeltaVix));
        assert!(set.contains(Feature::BbPos));
    }

    #[test]
    fn test_feature_names_round_trip() {
        for f in Feature::ALL {
            assert_eq!(Feature::from_name(f.name()), Some(f));
        }
        assert_eq!(Feature::from_name("unknown"), None);
        assert_eq!(Feature::DeltaVix.label(), "ΔVIX");
    }

    #[test]
    fn test_optional_features() {
        let optional: Vec<Feature> = Feature::ALL.into_iter().filter(Feature::is_optional).collect();
        assert_eq!(
            optional,
            vec![Feature::DeltaVix, Feature::Rsi14, Feature::MacdLine, Feature::BbPos]
        );
    }

    #[test]
    fn test_feature_serialization() {
        assert_eq!(
            serde_json::to_string(&Feature::RetIntradayPrevSign).unwrap(),
            "\"ret_intraday_prev_sign\""
        );
        assert_eq!(serde_json::to_string(&EarlySource::Imputed).unwrap(), "\"imputed\"");
    }

    #[test]
    fn test_row_vector_marks_missing_as_nan() {
        let mut row = FeatureRow::new(d("2024-01-02"), "AAPL");
        row.overnight_drift = Some(0.01);
        row.ma5 = Some(f64::INFINITY);

        let set = FeatureSet::new([Feature::OvernightDrift, Feature::Ma5, Feature::GarchVol]);
        let v = row.vector(&set);
        assert_eq!(v[0], 0.01);
        assert!(v[1].is_nan());
        assert!(v[2].is_nan());
    }

    #[test]
    fn test_set_value_matches_value() {
        let mut row = FeatureRow::new(d("2024-01-02"), "AAPL");
        for (i, f) in Feature::ALL.iter().enumerate() {
            row.set_value(*f, Some(i as f64));
        }
        for (i, f) in Feature::ALL.iter().enumerate() {
            assert_eq!(row.value(*f), Some(i as f64));
        }
    }

    #[test]
    fn test_row_usability() {
        let mut row = FeatureRow::new(d("2024-01-02"), "AAPL");
        assert!(!row.is_usable());

        row.p_early = Some(100.0);
        row.p_mid = Some(101.0);
        row.close_t_minus_1 = Some(99.0);
        assert!(!row.is_usable());

        row.ret_intraday_prev = Some(0.0);
        assert!(row.is_usable());
        assert!(!row.is_trainable());

        row.ret_intraday = Some(0.01);
        assert!(row.is_trainable());
    }

    #[test]
    fn test_table_grouping() {
        let table = FeatureTable {
            rows: vec![
                FeatureRow::new(d("2024-01-02"), "AAA"),
                FeatureRow::new(d("2024-01-03"), "AAA"),
                FeatureRow::new(d("2024-01-02"), "BBB"),
            ],
            feature_set: FeatureSet::all(),
        };

        assert_eq!(table.tickers(), vec!["AAA", "BBB"]);
        let groups = table.by_ticker();
        assert_eq!(groups["AAA"].len(), 2);
        assert_eq!(groups["BBB"].len(), 1);
        assert!(table.row(d("2024-01-03"), "AAA").is_some());
        assert!(table.row(d("2024-01-03"), "BBB").is_none());
    }

    #[test]
    fn test_no_predictions_is_empty() {
        let empty = DatePredictions::NoPredictions { date: d("2024-01-02") };
        assert!(empty.is_empty());
        assert!(empty.records().is_empty());
        assert_eq!(empty.date(), d("2024-01-02"));
    }
}
