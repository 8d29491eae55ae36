//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use super::super::types::{Feature, FeatureSet};

    #[test]
    fn test_prediction_config_default() {
        let config = PredictionConfig::default();
        assert_eq!(config.cap_base, 0.02);
        assert_eq!(config.cap_red, 0.08);
        assert_eq!(config.vix_red_threshold, 5.0);
        assert_eq!(config.garch_red_factor, 2.0);
        assert_eq!(config.margin_blend, 0.6);
    }

    #[test]
    fn test_model_config_default() {
        let config = ModelConfig::default();
        assert_eq!(config.regressor, RegressorKind::Ridge);
        assert_eq!(config.min_rows, 10);
        assert_eq!(config.max_validation, 48);
        assert_eq!(config.validation_divisor, 5);
        assert_eq!(config.clip_z, 5.0);
        assert!(!config.parallel);
    }

    #[test]
    fn test_confidence_config_default() {
        let config = ConfidenceConfig::default();
        assert_eq!(config.saturation, 1.2);
        assert_eq!(config.exponent, 0.7);
        assert!(config.weights.is_empty());
    }

    #[test]
    fn test_feature_config_default() {
        let config = FeatureConfig::default();
        assert!(config.use_garch);
        assert_eq!(config.garch_min_obs, 60);
        assert_eq!(config.ewma_alpha, 0.06);
        assert_eq!(config.ta_ffill_limit, 3);
        assert_eq!(config.rolling_scale, 0.1);
    }

    #[test]
    fn test_data_config_candidates() {
        let config = DataConfig::default();
        assert_eq!(config.close_candidates[0], "stock_prices_close_wide_format.csv");
        assert_eq!(config.vix_candidates, vec!["vix_prices.csv", "vix_open_clean.csv"]);
        assert_eq!(config.mid_file, "stock_prices_1030_wide_format.csv");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.data.data_dir, "./data");
        assert_eq!(config.output.history_file, "predictions_history.csv");
        assert!(config.output.write_newswire);
        assert!(config.output.use_lock);
    }

    #[test]
    fn test_partial_section_overrides() {
        let config: Config = toml::from_str(
            r#"
            [model]
            regressor = "gradient_boosting"
            min_rows = 30
            parallel = true

            [model.boosting]
            n_estimators = 50

            [prediction]
            cap_base = 0.015

            [features]
            include_ta = false
            "#,
        )
        .unwrap();

        assert_eq!(config.model.regressor, RegressorKind::GradientBoosting);
        assert_eq!(config.model.min_rows, 30);
        assert!(config.model.parallel);
        assert_eq!(config.model.boosting.n_estimators, 50);
        // Unset keys in a present section keep their defaults
        assert_eq!(config.model.boosting.max_depth, 2);
        assert_eq!(config.model.max_validation, 48);
        assert_eq!(config.prediction.cap_base, 0.015);
        assert_eq!(config.prediction.cap_red, 0.08);
        assert!(!config.features.include_ta);
        assert!(config.features.include_vix);
    }

    #[test]
    fn test_importance_vector_follows_set_order() {
        let mut config = ModelConfig::default();
        config.importance.insert("ma5".to_string(), 1.5);

        let set = FeatureSet::new([Feature::GarchVol, Feature::Ma5, Feature::OvernightDrift]);
        assert_eq!(config.importance_vector(&set), vec![8.0, 1.5, 8.0]);
    }

    #[test]
    fn test_confidence_weight_overrides() {
        let config: ConfidenceConfig = toml::from_str(
            r#"
            [weights]
            delta_vix = 2.0
            "#,
        )
        .unwrap();

        let set = FeatureSet::new([Feature::DeltaVix, Feature::Ret1]);
        assert_eq!(config.weight_vector(&set), vec![2.0, 6.0]);
    }

    #[test]
    fn test_requested_features() {
        assert_eq!(requested_features(&FeatureConfig::default()), FeatureSet::all());

        let config = FeatureConfig {
            include_vix: false,
            include_ta: false,
            ..Default::default()
        };
        let set = requested_features(&config);
        assert_eq!(set.len(), 8);
        assert!(!set.contains(Feature::DeltaVix));
        assert!(!set.contains(Feature::Rsi14));
        assert!(!set.contains(Feature::BbPos));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[output]\noutput_dir = \"/tmp/forecast\"\nwrite_newswire = false\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.output.write_newswire);
        assert_eq!(
            config.output.history_path(),
            std::path::PathBuf::from("/tmp/forecast/predictions_history.csv")
        );
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.model.min_rows, 10);
    }
}
