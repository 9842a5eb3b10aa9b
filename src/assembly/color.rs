//! Greedy graph coloring of elements by shared degrees of freedom.
//!
//! Two elements conflict if their DOF sets intersect; elements of one color are
//! pairwise conflict-free, so their contributions touch disjoint rows/columns of the
//! global operator. Parallel assembly processes colors one after another and
//! distributes the elements within a color across the thread pool.

use std::collections::BTreeSet;

#[derive(Debug)]
struct Color {
    members: Vec<usize>,
    dofs: BTreeSet<usize>,
}

impl Color {
    fn new(member: usize, dofs: &BTreeSet<usize>) -> Self {
        Self {
            members: vec![member],
            dofs: dofs.clone(),
        }
    }

    fn try_add(&mut self, member: usize, dofs: &BTreeSet<usize>) -> bool {
        if self.dofs.is_disjoint(dofs) {
            self.members.push(member);
            self.dofs.extend(dofs.iter().copied());
            true
        } else {
            false
        }
    }
}

/// Partitions elements `0..n` into conflict-free groups by sequential greedy coloring.
///
/// `element_dofs(e)` must yield the DOF set of element `e`. The members of each
/// returned group are in ascending element order, and every element appears in exactly
/// one group.
pub fn sequential_greedy_coloring(
    num_elements: usize,
    mut element_dofs: impl FnMut(usize, &mut Vec<usize>),
) -> Vec<Vec<usize>> {
    let mut colors = Vec::<Color>::new();
    let mut dof_buffer = Vec::new();
    let mut dof_set = BTreeSet::new();

    'element_loop: for element in 0..num_elements {
        dof_buffer.clear();
        element_dofs(element, &mut dof_buffer);
        dof_set.clear();
        dof_set.extend(dof_buffer.iter().copied());

        for color in &mut colors {
            if color.try_add(element, &dof_set) {
                continue 'element_loop;
            }
        }
        colors.push(Color::new(element, &dof_set));
    }

    colors.into_iter().map(|color| color.members).collect()
}
