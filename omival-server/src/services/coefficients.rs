//! Correction coefficient engine for enhanced property valuation
//!
//! OMI quotations give zone-wide EUR/m² ranges by conservation state. This
//! engine adjusts a selected range for property-specific factors (floor
//! level, renovation quality, exposure, noise, building condition, energy
//! class, elevator) following the standard Italian appraisal methodology
//! (coefficienti correttivi di merito).
//!
//! Percentages are additive, not compounded: the breakdown's per-factor
//! impacts are all measured against the unadjusted midpoint, so they sum
//! exactly to the total monetary delta regardless of application order.

use crate::services::benchmark::BenchmarkComparison;
use serde::Serialize;
use std::collections::HashMap;

/// One selectable option within a factor
#[derive(Debug, Clone)]
pub struct FactorOption {
    pub key: &'static str,
    pub label: &'static str,
    pub label_en: &'static str,
    pub pct: f64,
}

/// One correction factor with its ordered options
#[derive(Debug, Clone)]
pub struct Factor {
    pub key: &'static str,
    pub label: &'static str,
    pub label_en: &'static str,
    pub options: Vec<FactorOption>,
}

/// The full correction table. Immutable: built once at startup and shared
/// by reference. Factors keep a fixed order so breakdowns are reproducible.
#[derive(Debug, Clone)]
pub struct CoefficientTable {
    factors: Vec<Factor>,
}

fn opt(key: &'static str, pct: f64, label: &'static str, label_en: &'static str) -> FactorOption {
    FactorOption { key, label, label_en, pct }
}

impl CoefficientTable {
    /// The standard residential correction table.
    pub fn standard() -> Self {
        let factors = vec![
            Factor {
                key: "renovation",
                label: "Ristrutturazione",
                label_en: "Renovation",
                options: vec![
                    opt("premium_post_2015", 0.10, "Ristrutturazione integrale post-2015", "Premium renovation post-2015"),
                    opt("standard_recent", 0.05, "Ristrutturazione parziale/recente", "Standard/recent renovation"),
                    opt("none", 0.0, "Nessuna ristrutturazione", "No renovation"),
                    opt("needs_work", -0.10, "Da ristrutturare", "Needs renovation"),
                ],
            },
            Factor {
                key: "floor",
                label: "Piano",
                label_en: "Floor",
                options: vec![
                    opt("ground_semi", -0.05, "Piano terra / seminterrato", "Ground / semi-basement"),
                    opt("first", -0.02, "Primo piano", "First floor"),
                    opt("second", 0.0, "Secondo piano", "Second floor"),
                    opt("third_fourth", 0.05, "Terzo / quarto piano", "Third / fourth floor"),
                    opt("fifth_plus", 0.04, "Quinto piano e oltre", "Fifth floor and above"),
                    opt("penthouse", 0.08, "Attico / ultimo piano", "Penthouse / top floor"),
                ],
            },
            Factor {
                key: "exposure",
                label: "Esposizione / Luminosita",
                label_en: "Exposure / Light",
                options: vec![
                    opt("south_dual", 0.05, "Sud / doppia esposizione", "South / dual exposure"),
                    opt("east_west", 0.02, "Est / Ovest", "East / West"),
                    opt("north_only", -0.05, "Solo Nord", "North only"),
                    opt("internal_dark", -0.08, "Interno / poco luminoso", "Internal / low light"),
                ],
            },
            Factor {
                key: "noise",
                label: "Rumorosita",
                label_en: "Noise level",
                options: vec![
                    opt("very_silent", 0.03, "Molto silenzioso", "Very silent"),
                    opt("silent_courtyard", 0.02, "Cortile interno / silenzioso", "Internal courtyard / silent"),
                    opt("normal", 0.0, "Normale", "Normal"),
                    opt("street_moderate", -0.02, "Strada moderata", "Moderate street noise"),
                    opt("busy_street", -0.05, "Strada trafficata", "Busy street"),
                ],
            },
            Factor {
                key: "common_areas",
                label: "Parti comuni",
                label_en: "Common areas",
                options: vec![
                    opt("excellent", 0.02, "Ottime condizioni", "Excellent condition"),
                    opt("good", 0.0, "Buone condizioni", "Good condition"),
                    opt("needs_maintenance", -0.02, "Necessita manutenzione", "Needs maintenance"),
                    opt("poor", -0.05, "Cattive condizioni", "Poor condition"),
                    opt("serious_neglect", -0.07, "Gravi carenze", "Serious neglect"),
                ],
            },
            Factor {
                key: "building_facade",
                label: "Facciata edificio",
                label_en: "Building facade",
                options: vec![
                    opt("recently_restored", 0.02, "Recentemente restaurata", "Recently restored"),
                    opt("good_condition", 0.0, "Buone condizioni", "Good condition"),
                    opt("needs_work", -0.02, "Necessita intervento", "Needs work"),
                    opt("visibly_degraded", -0.05, "Visibilmente degradata", "Visibly degraded"),
                ],
            },
            Factor {
                key: "energy_class",
                label: "Classe energetica",
                label_en: "Energy class",
                options: vec![
                    opt("A_B", 0.05, "Classe A o B", "Class A or B"),
                    opt("C_D", 0.02, "Classe C o D", "Class C or D"),
                    opt("E", 0.0, "Classe E", "Class E"),
                    opt("F_G", -0.05, "Classe F o G", "Class F or G"),
                ],
            },
            Factor {
                key: "elevator",
                label: "Ascensore",
                label_en: "Elevator",
                options: vec![
                    opt("yes", 0.0, "Presente", "Yes"),
                    opt("no_low_floor", 0.0, "Assente (piano basso)", "No (low floor)"),
                    opt("no_high_floor", -0.05, "Assente (piano alto)", "No (high floor)"),
                ],
            },
        ];

        Self { factors }
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }
}

/// One row of the coefficient breakdown table
#[derive(Debug, Clone, Serialize)]
pub struct BreakdownItem {
    pub factor: String,
    pub factor_label: String,
    pub selected_key: String,
    pub selected_label: String,
    pub coefficient: f64,
    pub impact_eur_m2: f64,
}

/// Full adjusted-estimate result
#[derive(Debug, Clone, Serialize)]
pub struct AdjustedEstimate {
    pub base_price_min: f64,
    pub base_price_max: f64,
    pub base_conservation_state: String,
    pub total_coefficient: f64,
    pub adjusted_price_min: f64,
    pub adjusted_price_max: f64,
    pub adjusted_mid: f64,
    pub total_min: f64,
    pub total_max: f64,
    pub total_mid: f64,
    pub surface_m2: f64,
    pub breakdown: Vec<BreakdownItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark_comparison: Option<BenchmarkComparison>,
}

/// Round to 2 decimal places (EUR amounts)
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Apply correction coefficients to an OMI base price band.
///
/// `details` maps factor keys to selected option keys. Factors absent from
/// the map, and option keys the table does not know, contribute nothing:
/// the caller's UI may legitimately omit factors the user has not answered.
/// With no recognized factor the result equals the base band and the
/// breakdown is empty.
pub fn compute_adjusted_estimate(
    table: &CoefficientTable,
    base_price_min: f64,
    base_price_max: f64,
    surface_m2: f64,
    details: &HashMap<String, String>,
) -> AdjustedEstimate {
    let base_mid = (base_price_min + base_price_max) / 2.0;

    let mut breakdown = Vec::new();
    let mut total_pct = 0.0;

    for factor in table.factors() {
        let Some(selected_key) = details.get(factor.key) else {
            continue;
        };
        let Some(option) = factor.options.iter().find(|o| o.key == *selected_key) else {
            continue;
        };

        total_pct += option.pct;
        breakdown.push(BreakdownItem {
            factor: factor.key.to_string(),
            factor_label: factor.label.to_string(),
            selected_key: option.key.to_string(),
            selected_label: option.label.to_string(),
            coefficient: option.pct,
            // Measured against the unadjusted midpoint so rows sum to the
            // total delta independent of application order.
            impact_eur_m2: round2(base_mid * option.pct),
        });
    }

    let multiplier = 1.0 + total_pct;
    let adjusted_price_min = round2(base_price_min * multiplier);
    let adjusted_price_max = round2(base_price_max * multiplier);
    let adjusted_mid = round2(base_mid * multiplier);

    AdjustedEstimate {
        base_price_min,
        base_price_max,
        base_conservation_state: String::new(),
        total_coefficient: round4(total_pct),
        adjusted_price_min,
        adjusted_price_max,
        adjusted_mid,
        total_min: round2(adjusted_price_min * surface_m2),
        total_max: round2(adjusted_price_max * surface_m2),
        total_mid: round2(adjusted_mid * surface_m2),
        surface_m2,
        breakdown,
        benchmark_comparison: None,
    }
}

/// Factor/option listing for the frontend wizard
#[derive(Debug, Serialize)]
pub struct FactorOptions {
    pub label: String,
    pub label_en: String,
    pub options: Vec<OptionEntry>,
}

#[derive(Debug, Serialize)]
pub struct OptionEntry {
    pub key: String,
    pub label: String,
    pub label_en: String,
    pub pct: f64,
}

/// All coefficient factors with their options, keyed by factor name.
pub fn coefficient_options(table: &CoefficientTable) -> Vec<(String, FactorOptions)> {
    table
        .factors()
        .iter()
        .map(|factor| {
            (
                factor.key.to_string(),
                FactorOptions {
                    label: factor.label.to_string(),
                    label_en: factor.label_en.to_string(),
                    options: factor
                        .options
                        .iter()
                        .map(|o| OptionEntry {
                            key: o.key.to_string(),
                            label: o.label.to_string(),
                            label_en: o.label_en.to_string(),
                            pct: o.pct,
                        })
                        .collect(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn no_factors_is_identity() {
        let table = CoefficientTable::standard();
        let result = compute_adjusted_estimate(&table, 2000.0, 3000.0, 80.0, &HashMap::new());

        assert_eq!(result.total_coefficient, 0.0);
        assert_eq!(result.adjusted_price_min, 2000.0);
        assert_eq!(result.adjusted_price_max, 3000.0);
        assert_eq!(result.adjusted_mid, 2500.0);
        assert!(result.breakdown.is_empty());
    }

    #[test]
    fn unrecognized_keys_are_skipped() {
        let table = CoefficientTable::standard();
        let details = details(&[
            ("renovation", "does_not_exist"),
            ("swimming_pool", "yes"),
            ("floor", "penthouse"),
        ]);
        let result = compute_adjusted_estimate(&table, 2000.0, 3000.0, 80.0, &details);

        assert_eq!(result.breakdown.len(), 1);
        assert_eq!(result.breakdown[0].selected_key, "penthouse");
        assert_eq!(result.total_coefficient, 0.08);
    }

    #[test]
    fn worked_example() {
        let table = CoefficientTable::standard();
        let details = details(&[
            ("renovation", "premium_post_2015"), // +0.10
            ("floor", "penthouse"),              // +0.08
            ("energy_class", "F_G"),             // -0.05
        ]);
        let result = compute_adjusted_estimate(&table, 2000.0, 3000.0, 100.0, &details);

        assert_eq!(result.total_coefficient, 0.13);
        assert_eq!(result.adjusted_price_min, 2260.0);
        assert_eq!(result.adjusted_price_max, 3390.0);
        assert_eq!(result.adjusted_mid, 2825.0);
        assert_eq!(result.total_min, 226_000.0);
        assert_eq!(result.total_max, 339_000.0);
        assert_eq!(result.total_mid, 282_500.0);
    }

    #[test]
    fn breakdown_impacts_sum_to_total_delta() {
        let table = CoefficientTable::standard();
        let details = details(&[
            ("renovation", "needs_work"),
            ("floor", "ground_semi"),
            ("exposure", "south_dual"),
            ("noise", "busy_street"),
            ("common_areas", "serious_neglect"),
            ("building_facade", "recently_restored"),
            ("energy_class", "A_B"),
            ("elevator", "no_high_floor"),
        ]);
        let base_mid = (1850.0 + 2430.0) / 2.0;
        let result = compute_adjusted_estimate(&table, 1850.0, 2430.0, 95.0, &details);

        let impact_sum: f64 = result.breakdown.iter().map(|b| b.impact_eur_m2).sum();
        let total_delta = round2(base_mid * result.total_coefficient);
        // Each row is rounded to the cent, so allow half a cent per row.
        let tolerance = result.breakdown.len() as f64 * 0.005 + 1e-9;
        assert!(
            (impact_sum - total_delta).abs() <= tolerance,
            "impacts {impact_sum} vs delta {total_delta}"
        );

        assert_eq!(
            result.adjusted_mid,
            round2(base_mid * (1.0 + result.total_coefficient))
        );
    }

    #[test]
    fn impacts_are_relative_to_base_mid_not_adjusted() {
        let table = CoefficientTable::standard();
        let details = details(&[("renovation", "premium_post_2015"), ("floor", "penthouse")]);
        let result = compute_adjusted_estimate(&table, 2000.0, 3000.0, 80.0, &details);

        // 2500 * 0.10 and 2500 * 0.08, not midpoints compounded in sequence
        assert_eq!(result.breakdown[0].impact_eur_m2, 250.0);
        assert_eq!(result.breakdown[1].impact_eur_m2, 200.0);
    }

    #[test]
    fn options_listing_covers_all_factors_in_order() {
        let table = CoefficientTable::standard();
        let listing = coefficient_options(&table);
        let keys: Vec<&str> = listing.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            [
                "renovation",
                "floor",
                "exposure",
                "noise",
                "common_areas",
                "building_facade",
                "energy_class",
                "elevator"
            ]
        );
        let (_, renovation) = &listing[0];
        assert_eq!(renovation.options.len(), 4);
        assert_eq!(renovation.options[0].pct, 0.10);
    }
}
