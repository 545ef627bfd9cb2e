//! Arena of FFD boxes with an explicit parent/child graph.
//!
//! Boxes refer to each other by tag; `resolve_hierarchy` turns the tags into
//! index lists once and rejects unknown tags and cycles.

use std::collections::{HashMap, VecDeque};

use super::chunk::FfdBox;
use crate::error::{MotionError, Result};

#[derive(Debug, Clone, Default)]
pub struct FfdArena {
    boxes: Vec<FfdBox>,
    parents: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
    /// Topological order, parents before children
    order: Vec<usize>,
}

impl FfdArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, b: FfdBox) -> usize {
        self.boxes.push(b);
        self.parents.push(Vec::new());
        self.children.push(Vec::new());
        self.order.clear();
        self.boxes.len() - 1
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn get(&self, idx: usize) -> &FfdBox {
        &self.boxes[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut FfdBox {
        &mut self.boxes[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &FfdBox> {
        self.boxes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FfdBox> {
        self.boxes.iter_mut()
    }

    pub fn find(&self, tag: &str) -> Option<usize> {
        self.boxes.iter().position(|b| b.tag() == tag)
    }

    /// Index of a box by tag, as an error when missing.
    pub fn index_of(&self, tag: &str) -> Result<usize> {
        self.find(tag).ok_or_else(|| MotionError::UnknownBox(tag.to_string()))
    }

    pub fn parents_of(&self, idx: usize) -> &[usize] {
        &self.parents[idx]
    }

    pub fn children_of(&self, idx: usize) -> &[usize] {
        &self.children[idx]
    }

    /// Map tags to indices, check the graph is acyclic and assign levels.
    ///
    /// A relation may be declared on either side (parent lists the child,
    /// child lists the parent, or both).
    pub fn resolve_hierarchy(&mut self) -> Result<()> {
        let index: HashMap<&str, usize> = self.boxes.iter().enumerate().map(|(i, b)| (b.tag(), i)).collect();
        let n = self.boxes.len();
        let mut parents = vec![Vec::new(); n];
        let mut children = vec![Vec::new(); n];

        let link = |p: usize, c: usize, parents: &mut Vec<Vec<usize>>, children: &mut Vec<Vec<usize>>| {
            if !children[p].contains(&c) {
                children[p].push(c);
            }
            if !parents[c].contains(&p) {
                parents[c].push(p);
            }
        };

        for (i, b) in self.boxes.iter().enumerate() {
            for tag in b.children() {
                let c = *index.get(tag.as_str()).ok_or_else(|| MotionError::UnknownBox(tag.clone()))?;
                link(i, c, &mut parents, &mut children);
            }
            for tag in b.parents() {
                let p = *index.get(tag.as_str()).ok_or_else(|| MotionError::UnknownBox(tag.clone()))?;
                link(p, i, &mut parents, &mut children);
            }
        }

        // Kahn's algorithm
        let mut in_degree: Vec<usize> = parents.iter().map(|p| p.len()).collect();
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &c in &children[i] {
                in_degree[c] -= 1;
                if in_degree[c] == 0 {
                    queue.push_back(c);
                }
            }
        }
        if order.len() != n {
            let culprit = (0..n).find(|&i| in_degree[i] > 0).unwrap_or(0);
            return Err(MotionError::CyclicHierarchy(self.boxes[culprit].tag().to_string()));
        }

        let mut level = vec![0usize; n];
        for &i in &order {
            level[i] = parents[i].iter().map(|&p| level[p] + 1).max().unwrap_or(0);
        }
        for (b, &l) in self.boxes.iter_mut().zip(&level) {
            b.set_level(l);
        }

        self.parents = parents;
        self.children = children;
        self.order = order;
        Ok(())
    }

    /// Boxes in topological order (parents first).
    pub fn order(&self) -> Vec<usize> {
        if self.order.len() == self.boxes.len() {
            self.order.clone()
        } else {
            (0..self.boxes.len()).collect()
        }
    }

    /// Number of nesting levels.
    pub fn n_levels(&self) -> usize {
        self.boxes.iter().map(|b| b.level() + 1).max().unwrap_or(0)
    }

    /// Borrow a parent immutably and a child mutably at the same time.
    ///
    /// # Panics
    /// Panics if `parent == child`.
    pub fn pair_mut(&mut self, parent: usize, child: usize) -> (&FfdBox, &mut FfdBox) {
        assert_ne!(parent, child, "a box cannot be its own parent");
        if parent < child {
            let (lo, hi) = self.boxes.split_at_mut(child);
            (&lo[parent], &mut hi[0])
        } else {
            let (lo, hi) = self.boxes.split_at_mut(parent);
            (&hi[0], &mut lo[child])
        }
    }

    /// Cache every child's control points in the parametric space of its parents.
    pub fn set_parametric_coord_cp(&mut self, tol: f64, max_iterations: usize) {
        for p in self.order() {
            for c in self.children[p].clone() {
                let (parent, child) = self.pair_mut(p, c);
                child.set_parametric_coord_cp(parent, tol, max_iterations);
            }
        }
    }

    /// Propagate the deformation of box `idx` to all its descendants.
    pub fn update_children(&mut self, idx: usize) {
        let mut stack = vec![idx];
        while let Some(p) = stack.pop() {
            for c in self.children[p].clone() {
                let (parent, child) = self.pair_mut(p, c);
                child.get_cartesian_coord_cp(parent);
                stack.push(c);
            }
        }
    }

    /// Drop the design displacements of every box.
    pub fn reset_all(&mut self) {
        for b in &mut self.boxes {
            b.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn unit(tag: &str) -> FfdBox {
        FfdBox::axis_aligned(tag, [1, 1, 1], Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap()
    }

    #[test]
    fn test_levels_and_order() {
        let mut arena = FfdArena::new();
        let mut fuselage = unit("fuselage");
        fuselage.add_child("wing");
        let mut flap = unit("flap");
        flap.add_parent("wing");
        arena.add(flap);
        arena.add(unit("wing"));
        arena.add(fuselage);
        arena.resolve_hierarchy().unwrap();

        let order = arena.order();
        let pos = |tag: &str| order.iter().position(|&i| arena.get(i).tag() == tag).unwrap();
        assert!(pos("fuselage") < pos("wing"));
        assert!(pos("wing") < pos("flap"));
        assert_eq!(arena.get(arena.find("flap").unwrap()).level(), 2);
        assert_eq!(arena.n_levels(), 3);
    }

    #[test]
    fn test_cycle_detected() {
        let mut arena = FfdArena::new();
        let mut a = unit("a");
        a.add_child("b");
        let mut b = unit("b");
        b.add_child("a");
        arena.add(a);
        arena.add(b);
        assert!(matches!(arena.resolve_hierarchy(), Err(MotionError::CyclicHierarchy(_))));
    }

    #[test]
    fn test_unknown_tag() {
        let mut arena = FfdArena::new();
        let mut a = unit("a");
        a.add_parent("ghost");
        arena.add(a);
        assert!(matches!(arena.resolve_hierarchy(), Err(MotionError::UnknownBox(t)) if t == "ghost"));
    }
}
