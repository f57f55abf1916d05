// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use rstar::{AABB, RTree, RTreeObject};

use crate::cell::{CellId, WorkCell};
use crate::floorplan::Floorplan;
use crate::subrow::SubrowSet;
use crate::{BoundingBox, Coordinate};

#[derive(Debug, Clone, PartialEq)]
struct Member {
    /// `None` for a fixed obstacle.
    cell: Option<CellId>,
    offset: i64,
    y: i64,
    width: i64,
    height: i64,
}

/// Left and right extent of a cluster within one row, relative to the
/// cluster origin.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Slice {
    left: i64,
    right: i64,
}

/// Cells (and possibly obstacles) that move together. Unlike a single-row
/// cluster the members may sit in different rows, so the cluster keeps a
/// boundary per row it touches.
#[derive(Debug, Clone, PartialEq)]
struct MultiCluster {
    origin: i64,
    /// Contains a fixed obstacle and therefore cannot move.
    anchored: bool,
    weight: f64,
    displacement: f64,
    members: Vec<Member>,
    slices: BTreeMap<i64, Slice>,
}

impl MultiCluster {
    fn obstacle(bbox: &BoundingBox, floorplan: &Floorplan) -> Self {
        let mut cluster = MultiCluster {
            origin: bbox.min_x,
            anchored: true,
            weight: 0.0,
            displacement: 0.0,
            members: Vec::new(),
            slices: BTreeMap::new(),
        };
        cluster.push_member(
            Member {
                cell: None,
                offset: 0,
                y: bbox.min_y,
                width: bbox.width(),
                height: bbox.height(),
            },
            floorplan,
        );
        cluster
    }

    /// `cell` alone at `x`, which also becomes its target.
    fn single(cell: &WorkCell, x: i64, y: i64, floorplan: &Floorplan) -> Self {
        let mut cluster = MultiCluster {
            origin: x,
            anchored: false,
            weight: cell.weight,
            displacement: cell.weight * x as f64,
            members: Vec::new(),
            slices: BTreeMap::new(),
        };
        cluster.push_member(
            Member {
                cell: Some(cell.id),
                offset: 0,
                y,
                width: cell.width,
                height: cell.height,
            },
            floorplan,
        );
        cluster
    }

    fn push_member(&mut self, member: Member, floorplan: &Floorplan) {
        let first_row = floorplan.row_index(member.y);
        let last_row = floorplan.row_index(member.y + member.height - 1);
        for row in first_row..=last_row {
            let slice = Slice {
                left: member.offset,
                right: member.offset + member.width,
            };
            self.slices
                .entry(row)
                .and_modify(|s| {
                    s.left = s.left.min(slice.left);
                    s.right = s.right.max(slice.right);
                })
                .or_insert(slice);
        }
        self.members.push(member);
    }

    fn member_box(&self, member: &Member) -> BoundingBox {
        BoundingBox::new(
            self.origin + member.offset,
            member.y,
            self.origin + member.offset + member.width,
            member.y + member.height,
        )
    }

    fn boxes(&self) -> impl Iterator<Item = BoundingBox> + '_ {
        self.members.iter().map(|m| self.member_box(m))
    }

    /// x extent of the fixed obstacles in this cluster.
    fn fixed_span(&self) -> Option<(i64, i64)> {
        self.members
            .iter()
            .filter(|m| m.cell.is_none())
            .map(|m| self.member_box(m))
            .fold(None, |span, b| match span {
                None => Some((b.min_x, b.max_x)),
                Some((lo, hi)) => Some((lo.min(b.min_x), hi.max(b.max_x))),
            })
    }

    /// Moves a free cluster to its optimal site-aligned origin inside
    /// `[lower, upper)`. Returns `false` if the cluster cannot fit.
    fn place(&mut self, floorplan: &Floorplan, lower: i64, upper: i64) -> bool {
        if self.anchored {
            return self
                .members
                .iter()
                .filter(|m| m.cell.is_some())
                .all(|m| {
                    let x = self.origin + m.offset;
                    lower <= x && x + m.width <= upper
                });
        }

        let min_left = self.slices.values().map(|s| s.left).min().unwrap_or(0);
        let max_right = self.slices.values().map(|s| s.right).max().unwrap_or(0);
        let lo = floorplan.ceil_site(lower - min_left);
        let hi = floorplan.floor_site(upper - max_right);
        if lo > hi {
            return false;
        }
        let optimal = floorplan.nearest_site(self.displacement / self.weight);
        self.origin = optimal.clamp(lo, hi);
        true
    }

    /// `left` and `right` combined so that, in every row they share, `right`
    /// starts where `left` ends. `None` if both are anchored.
    fn merge(left: &MultiCluster, right: &MultiCluster, floorplan: &Floorplan) -> Option<Self> {
        let separation = left
            .slices
            .iter()
            .filter_map(|(row, l)| right.slices.get(row).map(|r| l.right - r.left))
            .max()
            .unwrap_or(right.origin - left.origin);

        let (base, delta) = match (left.anchored, right.anchored) {
            (false, false) => {
                let site = floorplan.site_width;
                (left.origin, (separation + site - 1).div_euclid(site) * site)
            }
            (true, false) => {
                let right_origin = floorplan.ceil_site(left.origin + separation);
                (left.origin, right_origin - left.origin)
            }
            (false, true) => {
                let left_origin = floorplan.floor_site(right.origin - separation);
                (left_origin, right.origin - left_origin)
            }
            (true, true) => return None,
        };

        let mut merged = MultiCluster {
            origin: base,
            anchored: left.anchored || right.anchored,
            weight: left.weight + right.weight,
            displacement: left.displacement + right.displacement - right.weight * delta as f64,
            members: Vec::with_capacity(left.members.len() + right.members.len()),
            slices: BTreeMap::new(),
        };
        for member in &left.members {
            merged.push_member(member.clone(), floorplan);
        }
        for member in &right.members {
            merged.push_member(
                Member {
                    offset: member.offset + delta,
                    ..member.clone()
                },
                floorplan,
            );
        }
        Some(merged)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PlacedBox {
    cluster: usize,
    envelope: AABB<[i64; 2]>,
}

impl RTreeObject for PlacedBox {
    type Envelope = AABB<[i64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PlacedBox {
    fn bbox(&self) -> BoundingBox {
        let [min_x, min_y] = self.envelope.lower();
        let [max_x, max_y] = self.envelope.upper();
        BoundingBox::new(min_x, min_y, max_x, max_y)
    }
}

struct Resolution {
    cluster: MultiCluster,
    absorbed: Vec<usize>,
}

/// Why a trial from one start position failed.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Blocked {
    Nowhere,
    /// The cell was pinned against fixed boxes covering `[min_x, max_x)`.
    Fixed { min_x: i64, max_x: i64 },
}

impl Blocked {
    fn against(clusters: &[&MultiCluster]) -> Self {
        clusters
            .iter()
            .filter_map(|c| c.fixed_span())
            .reduce(|(lo, hi), (l, h)| (lo.min(l), hi.max(h)))
            .map_or(Blocked::Nowhere, |(min_x, max_x)| Blocked::Fixed { min_x, max_x })
    }
}

/// Cluster compaction for cells that span several rows.
///
/// Every placed box (movable cells and fixed obstacles) lives in one R-tree.
/// A new cell starts at its target x, clamped into the candidate subrow.
/// Whenever the footprint of its cluster overlaps another cluster the two
/// are merged, the merged cluster moves to its optimal origin, and the new
/// footprint is tested again.
#[derive(Debug, Clone)]
pub struct MultiRowAbacus {
    floorplan: Floorplan,
    lower: i64,
    upper: i64,
    clusters: Vec<Option<MultiCluster>>,
    index: RTree<PlacedBox>,
}

impl MultiRowAbacus {
    /// Creates an engine that keeps cells inside the x range of `bounds`,
    /// with `obstacles` as immovable clusters.
    pub fn new(floorplan: &Floorplan, bounds: BoundingBox, obstacles: &[BoundingBox]) -> Self {
        let clusters = obstacles
            .iter()
            .filter(|b| !b.is_empty())
            .map(|b| Some(MultiCluster::obstacle(b, floorplan)))
            .collect::<Vec<_>>();
        let index = RTree::bulk_load(
            clusters
                .iter()
                .enumerate()
                .filter_map(|(i, c)| c.as_ref().map(|c| (i, c)))
                .flat_map(|(i, c)| {
                    c.boxes()
                        .map(|b| PlacedBox {
                            cluster: i,
                            envelope: b.to_aabb(),
                        })
                        .collect::<Vec<_>>()
                })
                .collect(),
        );
        MultiRowAbacus {
            floorplan: *floorplan,
            lower: bounds.min_x,
            upper: bounds.max_x,
            clusters,
            index,
        }
    }

    fn first_overlap(
        &self,
        cluster: &MultiCluster,
        absorbed: &[usize],
    ) -> Option<(usize, BoundingBox, BoundingBox)> {
        for mine in cluster.boxes() {
            for entry in self.index.locate_in_envelope_intersecting(&mine.to_aabb()) {
                if absorbed.contains(&entry.cluster) {
                    continue;
                }
                let theirs = entry.bbox();
                if theirs.intersects(&mine) {
                    return Some((entry.cluster, theirs, mine));
                }
            }
        }
        None
    }

    /// Works out the cluster `cell` would end up in if appended in `subrow`,
    /// without modifying anything. The cell starts at its target x clamped
    /// into the subrow; if it gets pinned against fixed boxes it is tried
    /// once more on each free side of them.
    fn resolve(&self, cell: &WorkCell, subrow: &BoundingBox, subrows: &SubrowSet) -> Option<Resolution> {
        let lo = self.floorplan.ceil_site(subrow.min_x.max(self.lower));
        let hi = self
            .floorplan
            .floor_site(subrow.max_x.min(self.upper) - cell.width);
        if lo > hi {
            return None;
        }
        let start = self
            .floorplan
            .nearest_site(cell.location.x as f64)
            .clamp(lo, hi);

        match self.resolve_from(cell, start, subrow.min_y, subrows) {
            Ok(resolution) => Some(resolution),
            Err(Blocked::Nowhere) => None,
            Err(Blocked::Fixed { min_x, max_x }) => {
                let mut starts = [
                    self.floorplan.floor_site(min_x - cell.width),
                    self.floorplan.ceil_site(max_x),
                ]
                .into_iter()
                .filter(|x| (lo..=hi).contains(x) && *x != start)
                .collect::<Vec<_>>();
                starts.sort_by_key(|x| (x - cell.location.x).abs());
                starts
                    .into_iter()
                    .find_map(|x| self.resolve_from(cell, x, subrow.min_y, subrows).ok())
            }
        }
    }

    fn resolve_from(
        &self,
        cell: &WorkCell,
        x: i64,
        y: i64,
        subrows: &SubrowSet,
    ) -> Result<Resolution, Blocked> {
        let mut current = MultiCluster::single(cell, x, y, &self.floorplan);
        if !current.place(&self.floorplan, self.lower, self.upper) {
            return Err(Blocked::Nowhere);
        }

        let mut absorbed = Vec::new();
        while let Some((other, theirs, mine)) = self.first_overlap(&current, &absorbed) {
            let other_cluster = self.clusters[other].as_ref().ok_or(Blocked::Nowhere)?;
            let merged = if theirs.center().0 <= mine.center().0 {
                MultiCluster::merge(other_cluster, &current, &self.floorplan)
            } else {
                MultiCluster::merge(&current, other_cluster, &self.floorplan)
            };
            let Some(merged) = merged else {
                return Err(Blocked::against(&[&current, other_cluster]));
            };
            absorbed.push(other);
            current = merged;
            if !current.place(&self.floorplan, self.lower, self.upper) {
                return Err(Blocked::against(&[&current]));
            }
        }

        let inside = current
            .members
            .iter()
            .filter(|m| m.cell.is_some())
            .all(|m| subrows.is_inside_subrows(&current.member_box(m)));
        if !inside {
            return Err(Blocked::Nowhere);
        }

        Ok(Resolution {
            cluster: current,
            absorbed,
        })
    }

    fn position_of(cluster: &MultiCluster, id: CellId) -> Option<Coordinate> {
        cluster
            .members
            .iter()
            .find(|m| m.cell == Some(id))
            .map(|m| Coordinate::new(cluster.origin + m.offset, m.y))
    }

    /// Where `cell` would land if appended with its bottom row in `subrow`,
    /// or `None` if it cannot be placed there. Nothing is modified.
    pub fn trial(&self, cell: &WorkCell, subrow: &BoundingBox, subrows: &SubrowSet) -> Option<Coordinate> {
        let resolution = self.resolve(cell, subrow, subrows)?;
        Self::position_of(&resolution.cluster, cell.id)
    }

    /// Appends `cell` in `subrow` for good and returns its position.
    pub fn insert(
        &mut self,
        cell: &WorkCell,
        subrow: &BoundingBox,
        subrows: &SubrowSet,
    ) -> Option<Coordinate> {
        let resolution = self.resolve(cell, subrow, subrows)?;

        for index in resolution.absorbed {
            if let Some(old) = self.clusters[index].take() {
                for bbox in old.boxes() {
                    self.index.remove(&PlacedBox {
                        cluster: index,
                        envelope: bbox.to_aabb(),
                    });
                }
            }
        }

        let slot = self.clusters.len();
        for bbox in resolution.cluster.boxes() {
            self.index.insert(PlacedBox {
                cluster: slot,
                envelope: bbox.to_aabb(),
            });
        }
        let position = Self::position_of(&resolution.cluster, cell.id);
        self.clusters.push(Some(resolution.cluster));
        position
    }

    /// Current position of every movable cell in the engine.
    pub fn positions(&self) -> Vec<(CellId, Coordinate)> {
        self.clusters
            .iter()
            .flatten()
            .flat_map(|cluster| {
                cluster.members.iter().filter_map(move |m| {
                    m.cell
                        .map(|id| (id, Coordinate::new(cluster.origin + m.offset, m.y)))
                })
            })
            .collect()
    }
}
