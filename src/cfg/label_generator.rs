use std::collections::{HashMap, HashSet};

use crate::tac::Label;

/// Mints labels that do not collide with any label already present in a procedure.
#[derive(Debug, Clone, Default)]
pub struct LabelGenerator {
    seen_subscripts: HashMap<String, usize>,
    taken: HashSet<Label>,
}
impl LabelGenerator {
    /// A generator which will never produce any of the given labels.
    pub fn avoiding<I: IntoIterator<Item = Label>>(taken: I) -> Self {
        Self {
            seen_subscripts: HashMap::new(),
            taken: taken.into_iter().collect(),
        }
    }

    /// Generates a new unique label.
    pub fn next_label<S: Into<String>>(&mut self, id: S) -> Label {
        let id = id.into();
        let current_subscript = self.seen_subscripts.entry(id.clone()).or_insert(0);
        loop {
            *current_subscript += 1;
            let label = Label::new(format!("{}_{}", id, current_subscript));
            if self.taken.insert(label.clone()) {
                return label;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_subscript_generates_ascending_subscripts() {
        let mut lbl_gen = LabelGenerator::default();

        assert_eq!("lbl_1", lbl_gen.next_label("lbl").to_string());
        assert_eq!("lbl_2", lbl_gen.next_label("lbl").to_string());
    }

    #[test]
    fn existing_labels_are_skipped() {
        let mut lbl_gen = LabelGenerator::avoiding([Label::new("b_1"), Label::new("b_3")]);

        assert_eq!("b_2", lbl_gen.next_label("b").to_string());
        assert_eq!("b_4", lbl_gen.next_label("b").to_string());
        assert_eq!("c_1", lbl_gen.next_label("c").to_string());
    }
}
