//! Union-Find data structure for grouping near-duplicate items.
//!
//! Disjoint sets over dense indices with path compression and
//! union-by-rank. `find` is iterative so long parent chains cannot
//! exhaust the stack.

/// Union-Find (Disjoint Set Union) data structure.
pub struct UnionFind {
    /// Parent pointers. parent[i] = j means i's parent is j.
    parent: Vec<usize>,
    /// Rank (upper bound on tree height) for union-by-rank.
    rank: Vec<u32>,
}

impl UnionFind {
    /// Create a new Union-Find structure with n singleton sets.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    /// Find the root of the set containing x.
    ///
    /// Every node visited on the way is re-pointed directly at the root.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }

        root
    }

    /// Union the sets containing x and y.
    ///
    /// The lower-ranked root is attached under the higher-ranked one; on a
    /// tie, y's root goes under x's root.
    ///
    /// Returns true if x and y were in different sets.
    pub fn union(&mut self, x: usize, y: usize) -> bool {
        let rx = self.find(x);
        let ry = self.find(y);

        if rx == ry {
            return false;
        }

        match self.rank[rx].cmp(&self.rank[ry]) {
            std::cmp::Ordering::Less => self.parent[rx] = ry,
            std::cmp::Ordering::Greater => self.parent[ry] = rx,
            std::cmp::Ordering::Equal => {
                self.parent[ry] = rx;
                self.rank[rx] += 1;
            }
        }

        true
    }

    #[cfg(test)]
    fn connected(&mut self, x: usize, y: usize) -> bool {
        self.find(x) == self.find(y)
    }
}
