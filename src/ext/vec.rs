pub trait RemoveWhere<T> {
    /// Remove and return the first element matching the predicate.
    fn find_remove<P>(&mut self, predicate: P) -> Option<T>
    where
        P: Fn(&T) -> bool;

    /// Remove a single occurrence of `item`. Returns whether one was found.
    fn remove_one(&mut self, item: &T) -> bool
    where
        T: PartialEq,
    {
        self.find_remove(|x| x == item).is_some()
    }
}

impl<T> RemoveWhere<T> for Vec<T> {
    fn find_remove<P>(&mut self, predicate: P) -> Option<T>
    where
        P: Fn(&T) -> bool,
    {
        self.iter().position(predicate).map(|pos| self.remove(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_one_keeps_other_occurrences() {
        let mut labels = vec!["a", "b", "a"];

        assert!(labels.remove_one(&"a"));
        assert_eq!(vec!["b", "a"], labels);
        assert!(!labels.remove_one(&"c"));
    }
}
