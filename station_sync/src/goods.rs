//! # Goods Loader
//!
//! Fetches a container's manifest and its outstanding pick tasks concurrently
//! and merges them into the goods list shown for a station.
//!
//! - A manifest failure (transport or non-zero `errCode`) is reported; the
//!   station's goods list is cleared and the message surfaces in its error field.
//! - A pick-task failure degrades to "no outstanding quantities": the manifest
//!   is still shown, every `pickQuantity` stays 0, no error is surfaced.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SyncError;
use crate::model::{is_vacant, GoodsLine, PickTask};
use crate::sources::WarehouseApi;

/// How a load presents itself on the station state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Arrivals, registrations and manual refresh: toggles the loading flag.
    Foreground,
    /// Timer refresh: updates data without touching the loading flag.
    Background,
}

/// Result of one manifest + pick-task fetch pair.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    /// Merged goods, or the manifest failure.
    pub goods: Result<Vec<GoodsLine>, SyncError>,
    /// `true` when the manifest request reached the WMS (even if it reported an error).
    pub wms_reachable: bool,
}

/// Sums outstanding quantities per `goodsNo`. Zero, negative and unparsable
/// quantities are dropped before summing.
pub fn aggregate_pick_tasks(tasks: &[PickTask]) -> HashMap<String, f64> {
    let mut totals: HashMap<String, f64> = HashMap::new();
    for task in tasks {
        let Some(quantity) = task.quantity().filter(|q| *q > 0.0) else {
            tracing::trace!(
                goods_no = %task.goods_no,
                raw = %task.pick_quantity,
                "pick task dropped"
            );
            continue;
        };
        *totals.entry(task.goods_no.clone()).or_insert(0.0) += quantity;
    }
    totals
}

/// Attaches the outstanding quantity to each manifest line (0 when none).
pub fn merge_pick_quantities(
    goods: Vec<GoodsLine>,
    picks: &HashMap<String, f64>,
) -> Vec<GoodsLine> {
    goods
        .into_iter()
        .map(|mut line| {
            line.pick_quantity = picks.get(&line.goods_no).copied().unwrap_or(0.0);
            line
        })
        .collect()
}

pub struct GoodsLoader {
    api: Arc<dyn WarehouseApi>,
}

impl GoodsLoader {
    pub fn new(api: Arc<dyn WarehouseApi>) -> Self {
        Self { api }
    }

    /// Fetches both sources for `container`. Returns `None` for vacant codes
    /// without issuing any request.
    pub async fn fetch(&self, container: &str) -> Option<LoadOutcome> {
        if is_vacant(container) {
            return None;
        }

        let (manifest, tasks) = tokio::join!(
            self.api.fetch_manifest(container),
            self.api.fetch_pick_tasks(container)
        );

        let picks = match tasks {
            Ok(response) if response.err_code == 0 => {
                aggregate_pick_tasks(&response.data.unwrap_or_default())
            }
            Ok(response) => {
                tracing::debug!(
                    container,
                    code = response.err_code,
                    "pick tasks unavailable, quantities default to 0"
                );
                HashMap::new()
            }
            Err(e) => {
                tracing::debug!(
                    container,
                    error = %e,
                    "pick tasks unavailable, quantities default to 0"
                );
                HashMap::new()
            }
        };

        let outcome = match manifest {
            Ok(response) if response.err_code == 0 => LoadOutcome {
                goods: Ok(merge_pick_quantities(response.data.unwrap_or_default(), &picks)),
                wms_reachable: true,
            },
            Ok(response) => LoadOutcome {
                goods: Err(SyncError::application(response.err_code, response.err_msg.as_deref())),
                wms_reachable: true,
            },
            Err(e) => LoadOutcome {
                goods: Err(e),
                wms_reachable: false,
            },
        };
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn task(goods_no: &str, quantity: Value) -> PickTask {
        PickTask {
            goods_no: goods_no.to_string(),
            pick_quantity: quantity,
        }
    }

    fn line(goods_no: &str) -> GoodsLine {
        GoodsLine {
            goods_no: goods_no.to_string(),
            goods_name: format!("name {}", goods_no),
            goods_spec: None,
            quantity: 10.0,
            unit: "pcs".to_string(),
            pick_quantity: 0.0,
        }
    }

    #[test]
    fn duplicate_goods_numbers_are_summed() {
        let totals = aggregate_pick_tasks(&[
            task("G1", json!(3)),
            task("G1", json!("4")),
            task("G2", json!(1.5)),
        ]);
        assert_eq!(totals["G1"], 7.0);
        assert_eq!(totals["G2"], 1.5);
    }

    #[test]
    fn non_positive_and_unparsable_quantities_are_dropped() {
        let totals = aggregate_pick_tasks(&[
            task("G1", json!(0)),
            task("G1", json!(-2)),
            task("G2", json!("abc")),
            task("G3", Value::Null),
            task("G1", json!(2)),
        ]);
        assert_eq!(totals.len(), 1);
        assert_eq!(totals["G1"], 2.0);
    }

    #[test]
    fn merge_defaults_to_zero() {
        let mut picks = HashMap::new();
        picks.insert("G2".to_string(), 5.0);
        let merged = merge_pick_quantities(vec![line("G1"), line("G2")], &picks);
        assert_eq!(merged[0].pick_quantity, 0.0);
        assert_eq!(merged[1].pick_quantity, 5.0);
        assert_eq!(merged[1].quantity, 10.0);
    }
}
