//! Mixed-radix indexing of joint variable states.
//!
//! Every place a local joint state is indexed (forward maps, message
//! marginalization, exhaustive enumeration, conditioning) uses the same
//! convention: slot 0 is the least-significant digit.

/// Maps between joint-state vectors over a cardinality vector and their
/// linear table index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointIndexer {
    card: Vec<usize>,
    n_states: usize,
}

impl JointIndexer {
    /// Cardinalities must all be non-zero.
    pub fn new(card: &[usize]) -> Self {
        debug_assert!(card.iter().all(|&c| c > 0));
        let n_states = card.iter().product();
        Self {
            card: card.to_vec(),
            n_states,
        }
    }

    pub fn card(&self) -> &[usize] {
        &self.card
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// Linear index of a joint state, slot 0 least significant.
    pub fn encode(&self, states: &[usize]) -> usize {
        debug_assert_eq!(states.len(), self.card.len());
        let mut idx = 0;
        for (&s, &c) in states.iter().zip(self.card.iter()).rev() {
            debug_assert!(s < c);
            idx = idx * c + s;
        }
        idx
    }

    /// Inverse of [`encode`](Self::encode); `states` must have one slot per
    /// cardinality entry.
    pub fn decode(&self, mut idx: usize, states: &mut [usize]) {
        debug_assert_eq!(states.len(), self.card.len());
        for (s, &c) in states.iter_mut().zip(self.card.iter()) {
            *s = idx % c;
            idx /= c;
        }
    }

    /// Visits every joint state in index order as `(index, state)`, without
    /// allocating per state.
    pub fn for_each_state(&self, mut f: impl FnMut(usize, &[usize])) {
        let mut state = vec![0; self.card.len()];
        for idx in 0..self.n_states {
            f(idx, &state);
            for (s, &c) in state.iter_mut().zip(self.card.iter()) {
                *s += 1;
                if *s < c {
                    break;
                }
                *s = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let ix = JointIndexer::new(&[2, 3, 2]);
        assert_eq!(ix.n_states(), 12);
        let mut state = [0; 3];
        for idx in 0..12 {
            ix.decode(idx, &mut state);
            assert_eq!(ix.encode(&state), idx);
        }
    }

    #[test]
    fn enumeration_order_is_first_slot_fastest() {
        let ix = JointIndexer::new(&[2, 2]);
        let mut seen = Vec::new();
        ix.for_each_state(|idx, s| seen.push((idx, s.to_vec())));
        assert_eq!(
            seen,
            vec![
                (0, vec![0, 0]),
                (1, vec![1, 0]),
                (2, vec![0, 1]),
                (3, vec![1, 1]),
            ]
        );
    }
}
