//! 同名道路的线段合并：去重后沿二度节点串接成尽量少的连续折线。

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;
use vicmap_core::geometry::{LinePath, Point2};

/// 节点坐标量化精度（每单位 10^6 格）。
const NODE_PRECISION: f64 = 1e6;

pub(crate) type NodeKey = (i64, i64);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MergeError {
    #[error("segments contain non-finite coordinates")]
    NonFinite,
    #[error("no valid segments to merge")]
    Empty,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    start: Point2,
    end: Point2,
    start_key: NodeKey,
    end_key: NodeKey,
}

impl Segment {
    /// 从 `from` 节点出发时的另一端。
    fn opposite(&self, from: NodeKey) -> (Point2, NodeKey) {
        if self.start_key == from {
            (self.end, self.end_key)
        } else {
            (self.start, self.start_key)
        }
    }
}

pub(crate) fn node_key(point: Point2) -> NodeKey {
    (
        (point.x() * NODE_PRECISION).round() as i64,
        (point.y() * NODE_PRECISION).round() as i64,
    )
}

/// 合并折线集合。输出顺序与折线方向只由输入顺序决定；
/// 合并结果再次输入时得到相同的端点与部分数量。
pub fn merge_lines(paths: &[LinePath]) -> Result<Vec<LinePath>, MergeError> {
    let segments = collect_segments(paths)?;
    if segments.is_empty() {
        return Err(MergeError::Empty);
    }

    let mut incident: HashMap<NodeKey, Vec<usize>> = HashMap::new();
    for (index, segment) in segments.iter().enumerate() {
        incident.entry(segment.start_key).or_default().push(index);
        incident.entry(segment.end_key).or_default().push(index);
    }

    let mut used = vec![false; segments.len()];
    let mut merged = Vec::new();
    for first in 0..segments.len() {
        if used[first] {
            continue;
        }
        used[first] = true;
        let seed = segments[first];
        let mut chain = VecDeque::from([seed.start, seed.end]);

        let mut tail = seed.end_key;
        while let Some((point, key)) = advance(&segments, &incident, &mut used, tail) {
            chain.push_back(point);
            tail = key;
        }
        let mut head = seed.start_key;
        while let Some((point, key)) = advance(&segments, &incident, &mut used, head) {
            chain.push_front(point);
            head = key;
        }

        merged.push(LinePath::new(chain.into_iter().collect()));
    }
    Ok(merged)
}

fn collect_segments(paths: &[LinePath]) -> Result<Vec<Segment>, MergeError> {
    let mut seen: HashSet<(NodeKey, NodeKey)> = HashSet::new();
    let mut segments = Vec::new();
    for path in paths {
        for pair in path.points().windows(2) {
            let (start, end) = (pair[0], pair[1]);
            if !start.is_finite() || !end.is_finite() {
                return Err(MergeError::NonFinite);
            }
            let (start_key, end_key) = (node_key(start), node_key(end));
            if start_key == end_key {
                continue;
            }
            // 双向道路的两条边只保留一条
            let undirected = if start_key <= end_key {
                (start_key, end_key)
            } else {
                (end_key, start_key)
            };
            if !seen.insert(undirected) {
                continue;
            }
            segments.push(Segment {
                start,
                end,
                start_key,
                end_key,
            });
        }
    }
    Ok(segments)
}

/// 仅在二度节点处继续延伸；端点与分叉点处停止。
fn advance(
    segments: &[Segment],
    incident: &HashMap<NodeKey, Vec<usize>>,
    used: &mut [bool],
    node: NodeKey,
) -> Option<(Point2, NodeKey)> {
    let touching = incident.get(&node)?;
    if touching.len() != 2 {
        return None;
    }
    let next = touching.iter().copied().find(|index| !used[*index])?;
    used[next] = true;
    Some(segments[next].opposite(node))
}
