//! 道路网络整理：查询（带回退）、投影、裁剪、按名称分组与合并。

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info, warn};
use vicmap_core::crs::{CrsDefinition, reproject_shape};
use vicmap_core::geometry::{LinePath, LonLat, Shape};
use vicmap_core::source::{NetworkType, RoadEdge, RoadName, RoadNetworkProvider, RoadQuery};

use crate::aoi::AreaOfInterest;
use crate::clip::{ClipFn, clip_to_area};
use crate::merge::merge_lines;

/// 没有名称的道路统一使用的占位标签，在合并前被丢弃。
pub const UNNAMED_LABEL: &str = "Unnamed Road";
const ALIAS_SEPARATOR: &str = " / ";

/// 把原始名称归一为单个标签。
pub fn normalize_label(name: &RoadName) -> String {
    match name {
        RoadName::Missing => UNNAMED_LABEL.to_string(),
        RoadName::Single(name) => {
            let name = name.trim();
            if name.is_empty() {
                UNNAMED_LABEL.to_string()
            } else {
                name.to_string()
            }
        }
        RoadName::Aliases(aliases) => {
            let parts: Vec<&str> = aliases
                .iter()
                .map(|alias| alias.trim())
                .filter(|alias| !alias.is_empty())
                .collect();
            if parts.is_empty() {
                UNNAMED_LABEL.to_string()
            } else {
                parts.join(ALIAS_SEPARATOR)
            }
        }
    }
}

/// 单次查询尝试的失败记录。
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAttempt {
    pub network_type: NetworkType,
    pub error: String,
}

impl fmt::Display for QueryAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.network_type, self.error)
    }
}

/// 按顺序尝试查询模式，每种模式只尝试一次。
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPolicy {
    modes: Vec<NetworkType>,
}

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub edges: Vec<RoadEdge>,
    pub succeeded: Option<NetworkType>,
    pub attempts: Vec<QueryAttempt>,
}

impl QueryPolicy {
    pub fn new(modes: Vec<NetworkType>) -> Self {
        Self { modes }
    }

    pub fn modes(&self) -> &[NetworkType] {
        &self.modes
    }

    /// 返回第一个成功（且非空）模式的结果；之前失败的模式记录在 `attempts` 中。
    pub fn execute<P>(&self, provider: &P, center: LonLat, distance_m: f64) -> QueryOutcome
    where
        P: RoadNetworkProvider + ?Sized,
    {
        let mut attempts = Vec::new();
        for &network_type in &self.modes {
            let query = RoadQuery {
                center,
                distance_m,
                network_type,
            };
            match provider.query(&query) {
                Ok(edges) if !edges.is_empty() => {
                    debug!(%network_type, edges = edges.len(), "道路查询成功");
                    return QueryOutcome {
                        edges,
                        succeeded: Some(network_type),
                        attempts,
                    };
                }
                Ok(_) => {
                    warn!(%network_type, "道路查询没有返回任何边，尝试下一种模式");
                    attempts.push(QueryAttempt {
                        network_type,
                        error: "没有返回任何道路".to_string(),
                    });
                }
                Err(err) => {
                    warn!(%network_type, error = %err, "道路查询失败，尝试下一种模式");
                    attempts.push(QueryAttempt {
                        network_type,
                        error: err.to_string(),
                    });
                }
            }
        }
        QueryOutcome {
            edges: Vec::new(),
            succeeded: None,
            attempts,
        }
    }
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self::new(vec![NetworkType::All, NetworkType::Drive])
    }
}

/// 合并后的一条具名道路。
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRoad {
    pub label: String,
    pub geometry: Shape,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoadStatus {
    Included { network_type: NetworkType },
    /// 所有查询模式都失败，道路图层为空。
    Omitted { attempts: Vec<QueryAttempt> },
}

impl RoadStatus {
    pub fn attempts_summary(&self) -> String {
        match self {
            RoadStatus::Included { network_type } => format!("{network_type} 查询成功"),
            RoadStatus::Omitted { attempts } if attempts.is_empty() => {
                "未配置任何查询模式".to_string()
            }
            RoadStatus::Omitted { attempts } => attempts
                .iter()
                .map(QueryAttempt::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoadAssembly {
    pub roads: Vec<NamedRoad>,
    pub status: RoadStatus,
    pub dropped_unnamed: usize,
    pub clip_fallbacks: usize,
    pub merge_fallbacks: usize,
}

pub struct RoadNetworkAssembler<'a> {
    policy: &'a QueryPolicy,
    working_crs: &'a CrsDefinition,
    clip: ClipFn,
}

impl<'a> RoadNetworkAssembler<'a> {
    pub fn new(policy: &'a QueryPolicy, working_crs: &'a CrsDefinition) -> Self {
        Self {
            policy,
            working_crs,
            clip: clip_to_area,
        }
    }

    pub fn with_clipper(mut self, clip: ClipFn) -> Self {
        self.clip = clip;
        self
    }

    pub fn assemble<P>(&self, provider: &P, aoi: &AreaOfInterest) -> RoadAssembly
    where
        P: RoadNetworkProvider + ?Sized,
    {
        let outcome = self
            .policy
            .execute(provider, aoi.centroid(), aoi.search_distance_m());
        let Some(network_type) = outcome.succeeded else {
            warn!(
                attempts = outcome.attempts.len(),
                "所有道路查询模式均失败，道路图层将为空"
            );
            return RoadAssembly {
                roads: Vec::new(),
                status: RoadStatus::Omitted {
                    attempts: outcome.attempts,
                },
                dropped_unnamed: 0,
                clip_fallbacks: 0,
                merge_fallbacks: 0,
            };
        };

        let source_crs = provider.source_crs();
        let mut groups: BTreeMap<String, Vec<LinePath>> = BTreeMap::new();
        let mut dropped_unnamed = 0usize;
        let mut clip_fallbacks = 0usize;
        for edge in &outcome.edges {
            let label = normalize_label(&edge.name);
            if label == UNNAMED_LABEL {
                dropped_unnamed += 1;
                continue;
            }
            let lines = edge.geometry.boundary();
            let projected = match reproject_shape(&lines, &source_crs, self.working_crs) {
                Ok(shape) => shape,
                Err(err) => {
                    warn!(road = %label, error = %err, "道路几何无法投影，已跳过");
                    continue;
                }
            };
            let clipped = match (self.clip)(&projected, aoi.polygon()) {
                Ok(Some(shape)) => shape,
                Ok(None) => continue,
                Err(err) => {
                    warn!(road = %label, error = %err, "道路裁剪失败，保留未裁剪几何");
                    clip_fallbacks += 1;
                    projected
                }
            };
            groups
                .entry(label)
                .or_default()
                .extend(clipped.paths().into_iter().cloned());
        }

        let mut merge_fallbacks = 0usize;
        let mut roads = Vec::with_capacity(groups.len());
        for (label, parts) in groups {
            let raw_parts = parts.len();
            let lines = match merge_lines(&parts) {
                Ok(lines) => lines,
                Err(err) => {
                    warn!(road = %label, error = %err, "线段合并失败，保留多段几何");
                    merge_fallbacks += 1;
                    parts
                }
            };
            debug!(road = %label, raw_parts, merged_parts = lines.len(), "道路分组已合并");
            if let Some(geometry) = Shape::from_lines(lines) {
                roads.push(NamedRoad { label, geometry });
            }
        }

        info!(
            %network_type,
            edges = outcome.edges.len(),
            roads = roads.len(),
            dropped_unnamed,
            "道路网络整理完成"
        );
        RoadAssembly {
            roads,
            status: RoadStatus::Included { network_type },
            dropped_unnamed,
            clip_fallbacks,
            merge_fallbacks,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use vicmap_core::geometry::Point2;
    use vicmap_core::source::ProviderError;

    /// 记录每次查询的模式，并按预设结果应答。
    struct ScriptedProvider {
        crs: CrsDefinition,
        answers: Vec<(NetworkType, Vec<RoadEdge>)>,
        calls: RefCell<Vec<NetworkType>>,
    }

    impl RoadNetworkProvider for ScriptedProvider {
        fn source_crs(&self) -> CrsDefinition {
            self.crs.clone()
        }

        fn query(&self, query: &RoadQuery) -> Result<Vec<RoadEdge>, ProviderError> {
            self.calls.borrow_mut().push(query.network_type);
            self.answers
                .iter()
                .find(|(mode, _)| *mode == query.network_type)
                .map(|(_, edges)| edges.clone())
                .ok_or_else(|| ProviderError::Unavailable("timeout".to_string()))
        }
    }

    fn edge(name: RoadName, points: &[(f64, f64)]) -> RoadEdge {
        RoadEdge {
            geometry: Shape::Line(LinePath::new(
                points.iter().map(|(x, y)| Point2::new(*x, *y)).collect(),
            )),
            name,
        }
    }

    fn single(name: &str) -> RoadName {
        RoadName::Single(name.to_string())
    }

    fn aoi() -> AreaOfInterest {
        // 经纬度工作坐标系下的小范围，便于手写坐标
        AreaOfInterest::build(Point2::new(-96.88, 32.76), 1.0, &CrsDefinition::Geographic, 64)
            .expect("aoi")
    }

    #[test]
    fn names_normalize_to_one_label() {
        assert_eq!(normalize_label(&RoadName::Missing), UNNAMED_LABEL);
        assert_eq!(normalize_label(&single("  Elm Street ")), "Elm Street");
        assert_eq!(normalize_label(&single("")), UNNAMED_LABEL);
        assert_eq!(
            normalize_label(&RoadName::Aliases(vec![
                "US 75".to_string(),
                " ".to_string(),
                "Central Expressway".to_string()
            ])),
            "US 75 / Central Expressway"
        );
        assert_eq!(normalize_label(&RoadName::Aliases(Vec::new())), UNNAMED_LABEL);
    }

    #[test]
    fn policy_falls_back_to_next_mode() {
        let provider = ScriptedProvider {
            crs: CrsDefinition::Geographic,
            answers: vec![(
                NetworkType::Drive,
                vec![edge(single("Elm"), &[(-96.88, 32.76), (-96.87, 32.76)])],
            )],
            calls: RefCell::new(Vec::new()),
        };
        let outcome = QueryPolicy::default().execute(&provider, LonLat::new(-96.88, 32.76), 1_609.344);
        assert_eq!(outcome.succeeded, Some(NetworkType::Drive));
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.attempts[0].network_type, NetworkType::All);
        assert_eq!(
            *provider.calls.borrow(),
            vec![NetworkType::All, NetworkType::Drive]
        );
    }

    #[test]
    fn empty_answer_counts_as_failure() {
        let provider = ScriptedProvider {
            crs: CrsDefinition::Geographic,
            answers: vec![(NetworkType::All, Vec::new())],
            calls: RefCell::new(Vec::new()),
        };
        let outcome = QueryPolicy::default().execute(&provider, LonLat::new(-96.88, 32.76), 100.0);
        assert_eq!(outcome.succeeded, None);
        assert_eq!(outcome.attempts.len(), 2);
    }

    #[test]
    fn assembler_groups_clips_and_merges() {
        let provider = ScriptedProvider {
            crs: CrsDefinition::Geographic,
            answers: vec![(
                NetworkType::All,
                vec![
                    edge(single("Elm Street"), &[(-96.885, 32.76), (-96.88, 32.76)]),
                    edge(single("Elm Street"), &[(-96.88, 32.76), (-96.875, 32.761)]),
                    edge(single("Elm Street"), &[(-96.875, 32.761), (-96.88, 32.76)]),
                    edge(RoadName::Missing, &[(-96.88, 32.765), (-96.88, 32.766)]),
                    edge(single("Far Road"), &[(-95.0, 30.0), (-95.1, 30.1)]),
                    edge(
                        single("Oak Avenue"),
                        &[(-96.88, 32.70), (-96.88, 32.82)],
                    ),
                ],
            )],
            calls: RefCell::new(Vec::new()),
        };
        let policy = QueryPolicy::default();
        let assembly =
            RoadNetworkAssembler::new(&policy, &CrsDefinition::Geographic).assemble(&provider, &aoi());

        assert_eq!(
            assembly.status,
            RoadStatus::Included {
                network_type: NetworkType::All
            }
        );
        assert_eq!(assembly.dropped_unnamed, 1);
        let labels: Vec<&str> = assembly.roads.iter().map(|road| road.label.as_str()).collect();
        assert_eq!(labels, vec!["Elm Street", "Oak Avenue"]);

        let elm = &assembly.roads[0].geometry;
        assert_eq!(elm.part_count(), 1);
        assert_eq!(elm.point_count(), 3);

        // 穿过整个缓冲圆的道路被截到圆内
        let oak = assembly.roads[1].geometry.paths()[0];
        let bounds = oak.bounds();
        assert!(bounds.min().y() > 32.74 && bounds.max().y() < 32.78);
    }

    fn failing_clip(
        _shape: &Shape,
        _area: &vicmap_core::geometry::PolygonShape,
    ) -> Result<Option<Shape>, crate::clip::ClipError> {
        crate::clip::guarded(|| panic!("overlay sweep panicked"))
    }

    #[test]
    fn failed_clip_keeps_unclipped_geometry() {
        let provider = ScriptedProvider {
            crs: CrsDefinition::Geographic,
            answers: vec![(
                NetworkType::All,
                vec![
                    edge(RoadName::Missing, &[(-96.88, 32.765), (-96.88, 32.766)]),
                    edge(single("Oak Avenue"), &[(-96.88, 32.70), (-96.88, 32.82)]),
                ],
            )],
            calls: RefCell::new(Vec::new()),
        };
        let policy = QueryPolicy::default();
        let assembly = RoadNetworkAssembler::new(&policy, &CrsDefinition::Geographic)
            .with_clipper(failing_clip)
            .assemble(&provider, &aoi());

        assert_eq!(assembly.clip_fallbacks, 1);
        assert_eq!(assembly.roads.len(), 1);
        let bounds = assembly.roads[0].geometry.paths()[0].bounds();
        assert!((bounds.min().y() - 32.70).abs() < 1e-12);
        assert!((bounds.max().y() - 32.82).abs() < 1e-12);
    }

    #[test]
    fn exhausted_policy_omits_roads() {
        let provider = ScriptedProvider {
            crs: CrsDefinition::Geographic,
            answers: Vec::new(),
            calls: RefCell::new(Vec::new()),
        };
        let policy = QueryPolicy::default();
        let assembly =
            RoadNetworkAssembler::new(&policy, &CrsDefinition::Geographic).assemble(&provider, &aoi());
        assert!(assembly.roads.is_empty());
        match &assembly.status {
            RoadStatus::Omitted { attempts } => assert_eq!(attempts.len(), 2),
            other => panic!("unexpected status {other:?}"),
        }
        assert!(assembly.status.attempts_summary().contains("timeout"));
    }
}
