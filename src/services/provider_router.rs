//! Provider Router: resolves a model and job constraints into an ordered
//! candidate list (§4.5).
//!
//! Filters by enabled/capability match, sorts survivors by priority, and
//! special-cases a weighted-random draw for `weighted` routing.

use rand::Rng;
use thiserror::Error;

use crate::domain::models::{Model, Provider, RoutingStrategy};

/// Constraints a task imposes on candidate providers.
#[derive(Debug, Clone, Default)]
pub struct RouteConstraints {
    pub required_durations: Vec<u32>,
    pub required_resolutions: Vec<String>,
    pub requires_pro: bool,
    pub requires_image_to_video: bool,
}

/// `(provider_id, provider_model_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub provider_id: String,
    pub provider_model_id: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("model '{0}' not found or disabled")]
    UnknownModel(String),
}

/// Filter and sort the providers in `model.provider_map` against
/// `constraints`, dropping disabled providers, empty model-id lists, and any
/// capability mismatch (§4.5 step 2), then sorting ascending by `priority`
/// with ties broken by input order (a stable sort, §9 open question (a)).
fn collect_candidates(model: &Model, providers: &[Provider], constraints: &RouteConstraints) -> Vec<(Provider, Vec<String>)> {
    let mut survivors: Vec<(Provider, Vec<String>)> = Vec::new();

    for (provider_id, provider_model_ids) in &model.provider_map {
        if provider_model_ids.is_empty() {
            continue;
        }
        let Some(provider) = providers.iter().find(|p| &p.id == provider_id) else {
            continue;
        };
        if !provider.enabled {
            continue;
        }
        if !provider.supports(
            &constraints.required_durations,
            &constraints.required_resolutions,
            constraints.requires_pro,
            constraints.requires_image_to_video,
        ) {
            continue;
        }
        survivors.push((provider.clone(), provider_model_ids.clone()));
    }

    survivors.sort_by_key(|(p, _)| p.priority);
    survivors
}

/// Weighted random draw: each candidate replicated `max(weight, 1)` times.
fn pick_weighted<R: Rng + ?Sized>(rng: &mut R, survivors: &[(Provider, Vec<String>)]) -> Option<(Provider, Vec<String>)> {
    let mut pool = Vec::new();
    for (provider, model_ids) in survivors {
        let weight = provider.weight.max(1);
        for _ in 0..weight {
            pool.push((provider.clone(), model_ids.clone()));
        }
    }
    if pool.is_empty() {
        return None;
    }
    let idx = rng.gen_range(0..pool.len());
    Some(pool.swap_remove(idx))
}

/// Resolve candidates for a task (§4.5 step 4).
///
/// - `default` and its degraded aliases (`manual`, `cost`, `latency`,
///   `quota`) return the full priority-sorted list; callers use the head.
/// - `failover` returns the full sorted list so workers can walk it.
/// - `weighted` picks a single provider by weighted random draw and returns
///   a one-element list.
///
/// # Errors
/// Returns `RouterError::UnknownModel` if `model.enabled` is false (the
/// caller is expected to have already looked the model up by id; an unknown
/// id never reaches this function).
pub fn select_candidates(model: &Model, providers: &[Provider], constraints: &RouteConstraints, strategy: RoutingStrategy) -> Result<Vec<Candidate>, RouterError> {
    if !model.enabled {
        return Err(RouterError::UnknownModel(model.id.clone()));
    }

    let survivors = collect_candidates(model, providers, constraints);

    let chosen = match strategy.effective() {
        RoutingStrategy::Weighted => {
            let mut rng = rand::thread_rng();
            pick_weighted(&mut rng, &survivors).into_iter().collect()
        }
        _ => survivors,
    };

    Ok(chosen
        .into_iter()
        .map(|(provider, model_ids)| Candidate {
            provider_id: provider.id,
            provider_model_id: model_ids.into_iter().next().unwrap_or_default(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ProviderCapabilities;

    fn provider(id: &str, priority: u32, enabled: bool) -> Provider {
        Provider {
            id: id.to_string(),
            display_name: id.to_string(),
            enabled,
            priority,
            weight: 1,
            capabilities: ProviderCapabilities {
                supports_image_to_video: true,
                supported_durations: vec![10],
                supported_resolutions: vec!["horizontal".to_string()],
                supports_pro: false,
            },
        }
    }

    fn model(map: Vec<(String, Vec<String>)>) -> Model {
        Model {
            id: "m1".to_string(),
            display_name: "m1".to_string(),
            description: String::new(),
            enabled: true,
            provider_map: map,
        }
    }

    fn constraints() -> RouteConstraints {
        RouteConstraints {
            required_durations: vec![10],
            required_resolutions: vec!["horizontal".to_string()],
            requires_pro: false,
            requires_image_to_video: false,
        }
    }

    #[test]
    fn sorts_ascending_by_priority() {
        let providers = vec![provider("p2", 20, true), provider("p1", 10, true)];
        let m = model(vec![("p1".to_string(), vec!["m1".to_string()]), ("p2".to_string(), vec!["m2".to_string()])]);
        let candidates = select_candidates(&m, &providers, &constraints(), RoutingStrategy::Default).unwrap();
        assert_eq!(candidates[0].provider_id, "p1");
        assert_eq!(candidates[1].provider_id, "p2");
    }

    #[test]
    fn disabled_provider_is_dropped() {
        let providers = vec![provider("p1", 10, false), provider("p2", 20, true)];
        let m = model(vec![("p1".to_string(), vec!["m1".to_string()]), ("p2".to_string(), vec!["m2".to_string()])]);
        let candidates = select_candidates(&m, &providers, &constraints(), RoutingStrategy::Default).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].provider_id, "p2");
    }

    #[test]
    fn capability_mismatch_is_dropped() {
        let providers = vec![provider("p1", 10, true)];
        let m = model(vec![("p1".to_string(), vec!["m1".to_string()])]);
        let mut c = constraints();
        c.requires_pro = true;
        let candidates = select_candidates(&m, &providers, &c, RoutingStrategy::Default).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn empty_provider_model_list_is_dropped() {
        let providers = vec![provider("p1", 10, true)];
        let m = model(vec![("p1".to_string(), vec![])]);
        let candidates = select_candidates(&m, &providers, &constraints(), RoutingStrategy::Default).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn weighted_returns_single_candidate() {
        let providers = vec![provider("p1", 10, true), provider("p2", 20, true)];
        let m = model(vec![("p1".to_string(), vec!["m1".to_string()]), ("p2".to_string(), vec!["m2".to_string()])]);
        let candidates = select_candidates(&m, &providers, &constraints(), RoutingStrategy::Weighted).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn degraded_strategies_behave_like_default() {
        let providers = vec![provider("p2", 20, true), provider("p1", 10, true)];
        let m = model(vec![("p1".to_string(), vec!["m1".to_string()]), ("p2".to_string(), vec!["m2".to_string()])]);
        for strategy in [RoutingStrategy::Manual, RoutingStrategy::Cost, RoutingStrategy::Latency, RoutingStrategy::Quota] {
            let candidates = select_candidates(&m, &providers, &constraints(), strategy).unwrap();
            assert_eq!(candidates[0].provider_id, "p1", "strategy {strategy:?} should degrade to default");
        }
    }

    #[test]
    fn disabled_model_is_an_error() {
        let mut m = model(vec![]);
        m.enabled = false;
        let err = select_candidates(&m, &[], &constraints(), RoutingStrategy::Default).unwrap_err();
        assert_eq!(err, RouterError::UnknownModel("m1".to_string()));
    }

    // §8-7 Router totality: if collection succeeds non-empty, the head
    // satisfies every required capability and is enabled.
    #[test]
    fn router_totality_head_is_enabled_and_satisfies_constraints() {
        let providers = vec![provider("p1", 10, true), provider("p2", 20, true)];
        let m = model(vec![("p1".to_string(), vec!["m1".to_string()]), ("p2".to_string(), vec!["m2".to_string()])]);
        let candidates = select_candidates(&m, &providers, &constraints(), RoutingStrategy::Default).unwrap();
        assert!(!candidates.is_empty());
        let head_provider = providers.iter().find(|p| p.id == candidates[0].provider_id).unwrap();
        assert!(head_provider.enabled);
        assert!(head_provider.supports(&constraints().required_durations, &constraints().required_resolutions, false, false));
    }
}
