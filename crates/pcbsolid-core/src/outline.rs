//! Incremental assembly of one directed chain of curves.
//!
//! Candidates are matched against the chain's two free ends within
//! `min_distance`: the front end is tried before the back end, and at each end
//! the unreversed attachment before the reversed one. There is no
//! backtracking; a candidate that fits nowhere is handed back unchanged.

use crate::curve::Curve;
use crate::geom::{point_in_ring, BBox2, Vec2};
use std::collections::VecDeque;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineState {
    Empty,
    Open,
    Closed,
}

/// How a candidate joins the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Seed,
    Prepend { reversed: bool },
    Append { reversed: bool },
}

#[derive(Debug, Clone)]
pub struct Outline {
    curves: VecDeque<Curve>,
    closed: bool,
    min_distance_sq: f64,
}

impl Outline {
    pub fn new(min_distance: f64) -> Self {
        Self {
            curves: VecDeque::new(),
            closed: false,
            min_distance_sq: min_distance * min_distance,
        }
    }

    pub fn state(&self) -> OutlineState {
        if self.closed {
            OutlineState::Closed
        } else if self.curves.is_empty() {
            OutlineState::Empty
        } else {
            OutlineState::Open
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Curve> {
        self.curves.iter()
    }

    /// Start of the first member.
    pub fn front_open(&self) -> Option<Vec2> {
        self.curves.front().map(Curve::start)
    }

    /// Logical end of the last member.
    pub fn back_open(&self) -> Option<Vec2> {
        self.curves.back().map(Curve::end)
    }

    fn coincide(&self, a: Vec2, b: Vec2) -> bool {
        a.distance_sq(b) < self.min_distance_sq
    }

    /// Decide where `candidate` would attach without changing the chain.
    pub fn match_candidate(&self, candidate: &Curve) -> Option<Attachment> {
        match self.state() {
            OutlineState::Closed => None,
            OutlineState::Empty => Some(Attachment::Seed),
            OutlineState::Open => {
                // A circle is a complete loop and never links to anything.
                if candidate.is_circle() {
                    return None;
                }
                let front = self.front_open()?;
                let back = self.back_open()?;
                if self.coincide(candidate.end(), front) {
                    Some(Attachment::Prepend { reversed: false })
                } else if self.coincide(candidate.start(), front) {
                    Some(Attachment::Prepend { reversed: true })
                } else if self.coincide(candidate.start(), back) {
                    Some(Attachment::Append { reversed: false })
                } else if self.coincide(candidate.end(), back) {
                    Some(Attachment::Append { reversed: true })
                } else {
                    None
                }
            }
        }
    }

    /// Attach `candidate`, or hand it back when it fits nowhere.
    pub fn add_segment(&mut self, mut candidate: Curve) -> Result<Attachment, Curve> {
        let Some(attachment) = self.match_candidate(&candidate) else {
            return Err(candidate);
        };

        match attachment {
            Attachment::Seed => {
                let circle = candidate.is_circle();
                self.curves.push_back(candidate);
                if circle {
                    self.closed = true;
                    return Ok(attachment);
                }
            }
            Attachment::Prepend { reversed } => {
                if reversed {
                    candidate.reverse();
                }
                self.curves.push_front(candidate);
            }
            Attachment::Append { reversed } => {
                if reversed {
                    candidate.reverse();
                }
                self.curves.push_back(candidate);
            }
        }

        if let (Some(front), Some(back)) = (self.front_open(), self.back_open()) {
            if self.coincide(front, back) {
                self.closed = true;
            }
        }
        Ok(attachment)
    }

    pub fn clear(&mut self) {
        self.curves.clear();
        self.closed = false;
    }

    /// Drain the members, leaving the outline empty and reusable.
    pub fn take_curves(&mut self) -> Vec<Curve> {
        self.closed = false;
        self.curves.drain(..).collect()
    }

    pub fn into_curves(self) -> Vec<Curve> {
        self.curves.into_iter().collect()
    }

    /// Polyline approximation of the whole chain.
    pub fn ring(&self) -> Vec<Vec2> {
        let mut ring: Vec<Vec2> = Vec::new();
        for curve in &self.curves {
            let pts = curve.sample();
            let skip = usize::from(!ring.is_empty());
            ring.extend(pts.into_iter().skip(skip));
        }
        if self.closed && ring.len() > 1 {
            ring.pop();
        }
        ring
    }

    pub fn bbox(&self) -> BBox2 {
        self.curves
            .iter()
            .fold(BBox2::empty(), |acc, c| acc.union(&c.bbox()))
    }

    /// Even-odd containment against the closed chain.
    pub fn contains_point(&self, point: Vec2) -> bool {
        self.closed && point_in_ring(point, &self.ring())
    }

    /// Whether the whole of `other` lies inside this closed outline.
    pub fn encloses(&self, other: &Outline) -> bool {
        if !self.closed || !self.bbox().contains_box(&other.bbox(), 0.0) {
            return false;
        }
        let ring = self.ring();
        other
            .iter()
            .flat_map(|c| [c.start(), c.end()])
            .all(|p| point_in_ring(p, &ring))
    }

    /// Multi-line listing of the members for diagnostics.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (i, curve) in self.curves.iter().enumerate() {
            let _ = writeln!(out, "  [{i}] {curve}");
        }
        out
    }
}
