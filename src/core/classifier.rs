//! Presence classifier: a bagged forest of decision trees with stratified
//! cross-validation and threshold-based prediction.

use crate::io::table::parse_optional;
use crate::types::{Feature, Label, MatchError, MatchResult, TrainingTable, BACKGROUND, PRESENCE};
use linfa::prelude::*;
use linfa::Dataset;
use linfa_trees::DecisionTree;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

const N_FEATURES: usize = 4;

/// Training parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerParams {
    pub n_trees: usize,
    pub n_folds: usize,
    pub seed: u64,
    pub max_depth: Option<usize>,
    /// Probability at or above which a point is predicted present
    pub threshold: f64,
}

impl Default for TrainerParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            n_folds: 5,
            seed: 42,
            max_depth: None,
            threshold: 0.5,
        }
    }
}

/// Feature matrix and labels of the complete rows of a table
#[derive(Debug, Clone)]
pub struct CleanData {
    pub features: Array2<f64>,
    pub labels: Array1<usize>,
    pub dropped: usize,
}

impl CleanData {
    /// Drop rows with any missing feature
    pub fn from_table(table: &TrainingTable) -> Self {
        let complete = table.complete_rows();
        let dropped = table.len() - complete.len();

        let mut features = Array2::<f64>::zeros((complete.len(), N_FEATURES));
        let mut labels = Array1::<usize>::zeros(complete.len());
        for (i, (row, label)) in complete.iter().enumerate() {
            for j in 0..N_FEATURES {
                features[[i, j]] = row[j];
            }
            labels[i] = *label as usize;
        }

        Self { features, labels, dropped }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn class_counts(&self) -> (usize, usize) {
        let presence = self.labels.iter().filter(|&&l| l == PRESENCE as usize).count();
        (self.len() - presence, presence)
    }
}

/// Outcome of a single prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub label: Label,
    pub probability: f64,
}

/// Fitted forest
#[derive(Serialize, Deserialize)]
pub struct HabitatModel {
    trees: Vec<DecisionTree<f64, usize>>,
    threshold: f64,
    feature_importance: Vec<f64>,
}

impl HabitatModel {
    /// Fit `params.n_trees` trees, each on a class-balanced bootstrap sample
    pub fn fit(
        features: &Array2<f64>,
        labels: &Array1<usize>,
        params: &TrainerParams,
        rng: &mut StdRng,
    ) -> MatchResult<Self> {
        let presence: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == PRESENCE as usize).collect();
        let background: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] != PRESENCE as usize).collect();
        if presence.is_empty() || background.is_empty() {
            return Err(MatchError::Training(
                "training data must contain both presence and background rows".to_string(),
            ));
        }
        if params.n_trees == 0 {
            return Err(MatchError::Training("forest needs at least one tree".to_string()));
        }

        let half = (labels.len() / 2).max(1);
        let mut trees = Vec::with_capacity(params.n_trees);
        let mut importance = vec![0.0; N_FEATURES];

        for _ in 0..params.n_trees {
            let mut sample: Vec<usize> = (0..half)
                .map(|_| presence[rng.gen_range(0..presence.len())])
                .collect();
            sample.extend((0..half).map(|_| background[rng.gen_range(0..background.len())]));

            let dataset = Dataset::new(
                features.select(Axis(0), &sample),
                labels.select(Axis(0), &sample),
            );
            let tree = DecisionTree::params()
                .max_depth(params.max_depth)
                .fit(&dataset)
                .map_err(|e| MatchError::Training(e.to_string()))?;

            for (total, value) in importance.iter_mut().zip(tree.feature_importance()) {
                if value.is_finite() {
                    *total += value;
                }
            }
            trees.push(tree);
        }

        let n = trees.len() as f64;
        importance.iter_mut().for_each(|v| *v /= n);

        Ok(Self {
            trees,
            threshold: params.threshold,
            feature_importance: importance,
        })
    }

    /// Fraction of trees voting presence, per row
    pub fn probabilities(&self, features: &Array2<f64>) -> Array1<f64> {
        let mut votes = Array1::<f64>::zeros(features.nrows());
        for tree in &self.trees {
            let predicted: Array1<usize> = tree.predict(features);
            for (vote, label) in votes.iter_mut().zip(predicted.iter()) {
                if *label == PRESENCE as usize {
                    *vote += 1.0;
                }
            }
        }
        let n = self.trees.len().max(1) as f64;
        votes.mapv(|v| v / n)
    }

    pub fn predict(&self, row: &[f64; N_FEATURES]) -> Prediction {
        let features = Array2::from_shape_fn((1, N_FEATURES), |(_, j)| row[j]);
        let probability = self.probabilities(&features)[0];
        Prediction {
            label: if probability >= self.threshold { PRESENCE } else { BACKGROUND },
            probability,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    pub fn feature_importance(&self) -> Vec<(Feature, f64)> {
        Feature::ALL.iter().copied().zip(self.feature_importance.iter().copied()).collect()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> MatchResult<()> {
        let file = std::fs::File::create(path.as_ref())?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)?;
        log::info!("Saved model with {} tree(s) to {}", self.trees.len(), path.as_ref().display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> MatchResult<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let model: HabitatModel = serde_json::from_reader(std::io::BufReader::new(file))?;
        if model.trees.is_empty() {
            return Err(MatchError::Training(format!(
                "model {} contains no trees",
                path.as_ref().display()
            )));
        }
        Ok(model)
    }

    /// Predict every row of a feature CSV, appending `predicted_prob` and
    /// `predicted_presence`. Rows with a missing or unreadable feature get empty
    /// prediction fields. Returns the number of rows predicted.
    pub fn predict_csv<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output: Q) -> MatchResult<usize> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(input.as_ref())?;
        let headers = reader.headers()?.clone();

        let mut columns = Vec::with_capacity(N_FEATURES);
        let mut missing = Vec::new();
        for feature in Feature::ALL {
            match headers.iter().position(|h| h == feature.name()) {
                Some(i) => columns.push(i),
                None => missing.push(feature.name()),
            }
        }
        if !missing.is_empty() {
            return Err(MatchError::Schema(format!(
                "input is missing required feature(s): {}",
                missing.join(", ")
            )));
        }

        let mut writer = csv::Writer::from_path(output.as_ref())?;
        let mut out_headers = headers.clone();
        out_headers.push_field("predicted_prob");
        out_headers.push_field("predicted_presence");
        writer.write_record(&out_headers)?;

        let mut predicted = 0usize;
        let mut skipped = 0usize;
        for record in reader.records() {
            let mut record = record?;
            let mut row = [0.0; N_FEATURES];
            let mut complete = true;
            for (j, &col) in columns.iter().enumerate() {
                match parse_optional(record.get(col).unwrap_or("")) {
                    Ok(Some(v)) => row[j] = v,
                    _ => complete = false,
                }
            }

            if complete {
                let prediction = self.predict(&row);
                record.push_field(&prediction.probability.to_string());
                record.push_field(&prediction.label.to_string());
                predicted += 1;
            } else {
                record.push_field("");
                record.push_field("");
                skipped += 1;
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;

        if skipped > 0 {
            log::warn!("{} row(s) had incomplete features and were not predicted", skipped);
        }
        log::info!("Predicted {} row(s) into {}", predicted, output.as_ref().display());
        Ok(predicted)
    }
}

/// Parse user-supplied feature values in column order, rejecting anything non-numeric
pub fn parse_feature_row(fields: &[&str]) -> MatchResult<[f64; N_FEATURES]> {
    if fields.len() != N_FEATURES {
        return Err(MatchError::InvalidInput(format!(
            "expected {} values ({}), got {}",
            N_FEATURES,
            Feature::ALL.map(|f| f.name()).join(", "),
            fields.len()
        )));
    }

    let mut row = [0.0; N_FEATURES];
    for (j, (feature, text)) in Feature::ALL.iter().zip(fields).enumerate() {
        row[j] = text.trim().parse().map_err(|_| {
            MatchError::InvalidInput(format!("{} must be a number, got {:?}", feature, text))
        })?;
    }
    validate_feature_values(row)
}

/// Reject NaN or infinite feature values, naming the first offending column
pub fn validate_feature_values(row: [f64; N_FEATURES]) -> MatchResult<[f64; N_FEATURES]> {
    match Feature::ALL.iter().zip(&row).find(|(_, v)| !v.is_finite()) {
        Some((feature, _)) => Err(MatchError::InvalidInput(format!("{} must be finite", feature))),
        None => Ok(row),
    }
}

/// Area under the ROC curve via the rank-sum statistic, ties averaged.
///
/// `None` when either class is absent.
pub fn roc_auc(labels: &[usize], scores: &[f64]) -> Option<f64> {
    let n = labels.len().min(scores.len());
    let positives = labels[..n].iter().filter(|&&l| l == PRESENCE as usize).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; tied block i..=j shares the mean rank
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = rank;
        }
        i = j + 1;
    }

    let positive_rank_sum: f64 = (0..n)
        .filter(|&k| labels[k] == PRESENCE as usize)
        .map(|k| ranks[k])
        .sum();
    let p = positives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}

/// Shuffle each class and deal it across `k` folds; returns held-out indices per fold
pub fn stratified_folds(labels: &[usize], k: usize, rng: &mut StdRng) -> MatchResult<Vec<Vec<usize>>> {
    if k < 2 {
        return Err(MatchError::Training(format!("need at least 2 folds, got {}", k)));
    }

    let mut folds = vec![Vec::new(); k];
    let mut offset = 0;
    for class in [BACKGROUND as usize, PRESENCE as usize] {
        let mut members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        if members.len() < k {
            return Err(MatchError::Training(format!(
                "class {} has {} row(s), fewer than {} folds",
                class,
                members.len(),
                k
            )));
        }
        members.shuffle(rng);
        for (n, index) in members.into_iter().enumerate() {
            folds[(n + offset) % k].push(index);
        }
        offset += 1;
    }

    for fold in folds.iter_mut() {
        fold.sort_unstable();
    }
    Ok(folds)
}

/// Cross-validation summary
#[derive(Debug, Clone, Serialize)]
pub struct CrossValidationReport {
    pub rows_used: usize,
    pub rows_dropped: usize,
    pub background_rows: usize,
    pub presence_rows: usize,
    pub fold_auc: Vec<Option<f64>>,
    pub mean_auc: f64,
    pub std_auc: f64,
    /// Mean importance across folds, highest first
    pub feature_importance: Vec<(Feature, f64)>,
}

/// Stratified k-fold evaluation of the forest on the complete rows of `table`
pub fn cross_validate(table: &TrainingTable, params: &TrainerParams) -> MatchResult<CrossValidationReport> {
    let data = CleanData::from_table(table);
    log::info!("Dropped {} row(s) with missing data", data.dropped);
    if data.is_empty() {
        return Err(MatchError::EmptyResult("no complete rows left after cleaning".to_string()));
    }

    let (background_rows, presence_rows) = data.class_counts();
    log::info!("Class balance: {} background, {} presence", background_rows, presence_rows);

    let mut rng = StdRng::seed_from_u64(params.seed);
    let labels = data.labels.to_vec();
    let folds = stratified_folds(&labels, params.n_folds, &mut rng)?;

    let mut fold_auc = Vec::with_capacity(folds.len());
    let mut importance = vec![0.0; N_FEATURES];

    for (f, test_idx) in folds.iter().enumerate() {
        let train_idx: Vec<usize> = (0..data.len()).filter(|i| test_idx.binary_search(i).is_err()).collect();

        let mut fold_rng = StdRng::seed_from_u64(params.seed.wrapping_add(f as u64 + 1));
        let model = HabitatModel::fit(
            &data.features.select(Axis(0), &train_idx),
            &data.labels.select(Axis(0), &train_idx),
            params,
            &mut fold_rng,
        )?;

        let test_labels = data.labels.select(Axis(0), test_idx);
        let scores = model.probabilities(&data.features.select(Axis(0), test_idx));
        let auc = roc_auc(&test_labels.to_vec(), &scores.to_vec());
        match auc {
            Some(a) => log::info!("Fold {}/{}: AUC {:.4}", f + 1, folds.len(), a),
            None => log::warn!("Fold {}/{}: AUC undefined (single class)", f + 1, folds.len()),
        }
        fold_auc.push(auc);

        for (total, (_, value)) in importance.iter_mut().zip(model.feature_importance()) {
            *total += value;
        }
    }

    let scored: Vec<f64> = fold_auc.iter().flatten().copied().collect();
    let mean_auc = if scored.is_empty() { f64::NAN } else { scored.iter().sum::<f64>() / scored.len() as f64 };
    let std_auc = if scored.is_empty() {
        f64::NAN
    } else {
        (scored.iter().map(|a| (a - mean_auc).powi(2)).sum::<f64>() / scored.len() as f64).sqrt()
    };

    let mut feature_importance: Vec<(Feature, f64)> = Feature::ALL
        .iter()
        .copied()
        .zip(importance.iter().map(|v| v / folds.len() as f64))
        .collect();
    feature_importance.sort_by(|a, b| b.1.total_cmp(&a.1));

    log::info!("Mean AUC {:.4} (std {:.4})", mean_auc, std_auc);
    Ok(CrossValidationReport {
        rows_used: data.len(),
        rows_dropped: data.dropped,
        background_rows,
        presence_rows,
        fold_auc,
        mean_auc,
        std_auc,
        feature_importance,
    })
}

/// Cross-validate, then refit on every complete row
pub fn train(table: &TrainingTable, params: &TrainerParams) -> MatchResult<(CrossValidationReport, HabitatModel)> {
    let report = cross_validate(table, params)?;

    log::info!("Training final model on all {} complete row(s)", report.rows_used);
    let data = CleanData::from_table(table);
    let mut rng = StdRng::seed_from_u64(params.seed);
    let model = HabitatModel::fit(&data.features, &data.labels, params, &mut rng)?;
    Ok((report, model))
}
