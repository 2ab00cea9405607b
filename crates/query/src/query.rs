//! Immutable query descriptions.

use crate::error::{QueryError, Result};
use crate::expr::{PropertyRef, SortKey, SortOrder};
use crate::predicate::Predicate;
use crate::sort;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::marker::PhantomData;
use vellum_core::Model;

/// What to fetch: an optional predicate, a non-empty sort order and an
/// optional property projection.
///
/// A `Query` can only be obtained from [`QueryBuilder::build`], which
/// resolves every property against `T::schema()`. Queries compare
/// structurally.
pub struct Query<T> {
    predicate: Option<Predicate>,
    sort: Vec<SortKey>,
    projection: Vec<PropertyRef>,
    _model: PhantomData<fn() -> T>,
}

impl<T: Model> Query<T> {
    /// Starts building a query.
    pub fn builder() -> QueryBuilder<T> {
        QueryBuilder::new()
    }

    /// Returns the predicate, if any.
    #[inline]
    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Returns the sort keys, in priority order.
    #[inline]
    pub fn sort(&self) -> &[SortKey] {
        &self.sort
    }

    /// Returns the projected properties; empty means every property.
    #[inline]
    pub fn projection(&self) -> &[PropertyRef] {
        &self.projection
    }

    /// Evaluates the predicate in memory. No predicate accepts everything.
    #[inline]
    pub fn matches(&self, object: &T) -> bool {
        self.predicate.as_ref().map_or(true, |p| p.eval(object))
    }

    /// Total order: sort keys in sequence, then identity.
    #[inline]
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        sort::compare_objects(&self.sort, a, b)
    }

    /// Sorts objects by this query's order.
    pub fn sort_objects(&self, objects: Vec<T>) -> Vec<T> {
        sort::sort_objects(&self.sort, objects)
    }

    /// Returns true if `objects` is already in this query's order.
    pub fn is_sorted(&self, objects: &[T]) -> bool {
        sort::is_sorted(&self.sort, objects)
    }

    /// True if both queries select the same objects.
    #[inline]
    pub fn same_filter(&self, other: &Self) -> bool {
        self.predicate == other.predicate
    }

    /// True if both queries order objects the same way.
    #[inline]
    pub fn same_sort(&self, other: &Self) -> bool {
        self.sort == other.sort
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
            sort: self.sort.clone(),
            projection: self.projection.clone(),
            _model: PhantomData,
        }
    }
}

impl<T> PartialEq for Query<T> {
    fn eq(&self, other: &Self) -> bool {
        self.predicate == other.predicate
            && self.sort == other.sort
            && self.projection == other.projection
    }
}

impl<T> Eq for Query<T> {}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("predicate", &self.predicate)
            .field("sort", &self.sort)
            .field("projection", &self.projection)
            .finish()
    }
}

impl<T> fmt::Display for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.predicate {
            Some(p) => write!(f, "WHERE {}", p)?,
            None => f.write_str("ALL")?,
        }
        f.write_str(" ORDER BY ")?;
        for (i, key) in self.sort.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let dir = match key.order {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            };
            write!(f, "{} {}", key.property, dir)?;
        }
        Ok(())
    }
}

/// Builder for [`Query`].
pub struct QueryBuilder<T> {
    predicate: Option<Predicate>,
    sort: Vec<SortKey>,
    projection: Vec<PropertyRef>,
    _model: PhantomData<fn() -> T>,
}

impl<T: Model> Default for QueryBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Model> QueryBuilder<T> {
    pub fn new() -> Self {
        Self {
            predicate: None,
            sort: Vec::new(),
            projection: Vec::new(),
            _model: PhantomData,
        }
    }

    /// Adds a filter. Repeated calls are combined with AND.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Appends a sort key.
    pub fn sort_by(mut self, property: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push(SortKey::new(PropertyRef::new(property), order));
        self
    }

    pub fn ascending(self, property: impl Into<String>) -> Self {
        self.sort_by(property, SortOrder::Asc)
    }

    pub fn descending(self, property: impl Into<String>) -> Self {
        self.sort_by(property, SortOrder::Desc)
    }

    /// Restricts the fetched properties. Must include every sort key.
    pub fn project<S: Into<String>>(mut self, properties: impl IntoIterator<Item = S>) -> Self {
        self.projection
            .extend(properties.into_iter().map(|p| PropertyRef::new(p)));
        self
    }

    /// Resolves and validates the query against `T::schema()`.
    pub fn build(self) -> Result<Query<T>> {
        let schema = T::schema();

        let mut predicate = self.predicate;
        if let Some(p) = predicate.as_mut() {
            p.resolve(&schema)?;
        }

        if self.sort.is_empty() {
            return Err(QueryError::EmptySort);
        }
        let mut sort = self.sort;
        for key in sort.iter_mut() {
            let def = schema
                .property(&key.property.name)
                .ok_or_else(|| QueryError::unknown_property(schema.name(), &key.property.name))?;
            if !def.data_type().is_sortable() {
                return Err(QueryError::UnsortableProperty {
                    property: key.property.name.clone(),
                    data_type: def.data_type(),
                });
            }
            key.property.index = Some(def.index());
        }

        let mut projection = self.projection;
        for property in projection.iter_mut() {
            let index = schema
                .index_of(&property.name)
                .ok_or_else(|| QueryError::unknown_property(schema.name(), &property.name))?;
            property.index = Some(index);
        }
        projection.sort_by_key(|p| p.index);
        projection.dedup();
        if !projection.is_empty() {
            for key in &sort {
                if !projection.iter().any(|p| p.index == key.property.index) {
                    return Err(QueryError::ProjectionMissingSortKey {
                        property: key.property.name.clone(),
                    });
                }
            }
        }

        Ok(Query {
            predicate,
            sort,
            projection,
            _model: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;
    use vellum_core::{DataType, EntitySchema, ObjectId, Property, Value};

    #[derive(Clone, Debug, PartialEq)]
    struct Doc {
        id: ObjectId,
        title: String,
        score: i64,
        blob: Vec<u8>,
    }

    impl Model for Doc {
        fn schema() -> EntitySchema {
            EntitySchema::new(
                "Doc",
                vec![
                    Property::new("title", DataType::String),
                    Property::new("score", DataType::Int64),
                    Property::new("blob", DataType::Bytes),
                ],
            )
        }

        fn id(&self) -> ObjectId {
            self.id
        }

        fn field(&self, index: usize) -> Option<Value> {
            match index {
                0 => Some(Value::String(self.title.clone())),
                1 => Some(Value::Int64(self.score)),
                2 => Some(Value::Bytes(self.blob.clone())),
                _ => None,
            }
        }
    }

    fn doc(id: u64, title: &str, score: i64) -> Doc {
        Doc {
            id: ObjectId::new(id),
            title: title.into(),
            score,
            blob: Vec::new(),
        }
    }

    #[test]
    fn test_build_resolves_properties() {
        let query = Query::<Doc>::builder()
            .filter(Predicate::gt("score", 1i64))
            .descending("score")
            .ascending("title")
            .build()
            .unwrap();

        assert_eq!(query.sort()[0].property.index, Some(1));
        assert_eq!(query.sort()[1].property.index, Some(0));
        assert!(query.predicate().unwrap().properties()[0].is_resolved());
    }

    #[test]
    fn test_build_empty_sort() {
        let result = Query::<Doc>::builder().build();
        assert_eq!(result.unwrap_err(), QueryError::EmptySort);
    }

    #[test]
    fn test_build_unknown_sort_property() {
        let result = Query::<Doc>::builder().ascending("missing").build();
        assert!(matches!(result, Err(QueryError::UnknownProperty { .. })));
    }

    #[test]
    fn test_build_unsortable_property() {
        let result = Query::<Doc>::builder().ascending("blob").build();
        assert!(matches!(result, Err(QueryError::UnsortableProperty { .. })));
    }

    #[test]
    fn test_projection_must_cover_sort_keys() {
        let result = Query::<Doc>::builder()
            .ascending("score")
            .project(["title"])
            .build();
        assert_eq!(
            result.unwrap_err(),
            QueryError::ProjectionMissingSortKey {
                property: "score".into()
            }
        );

        let query = Query::<Doc>::builder()
            .ascending("score")
            .project(["title", "score", "title"])
            .build()
            .unwrap();
        assert_eq!(query.projection().len(), 2);
    }

    #[test]
    fn test_filter_combines_with_and() {
        let query = Query::<Doc>::builder()
            .filter(Predicate::gt("score", 1i64))
            .filter(Predicate::like("title", "a%"))
            .ascending("score")
            .build()
            .unwrap();

        assert!(query.matches(&doc(1, "apple", 2)));
        assert!(!query.matches(&doc(1, "apple", 1)));
        assert!(!query.matches(&doc(1, "pear", 2)));
    }

    #[test]
    fn test_no_predicate_matches_everything() {
        let query = Query::<Doc>::builder().ascending("score").build().unwrap();
        assert!(query.matches(&doc(1, "", i64::MIN)));
    }

    #[test]
    fn test_structural_equality() {
        let a = Query::<Doc>::builder()
            .filter(Predicate::gt("score", 1i64))
            .ascending("score")
            .build()
            .unwrap();
        let b = a.clone();
        let c = Query::<Doc>::builder()
            .filter(Predicate::gt("score", 2i64))
            .ascending("score")
            .build()
            .unwrap();
        let d = Query::<Doc>::builder()
            .filter(Predicate::gt("score", 1i64))
            .descending("score")
            .build()
            .unwrap();

        assert_eq!(a, b);
        assert!(!a.same_filter(&c) && a.same_sort(&c));
        assert!(a.same_filter(&d) && !a.same_sort(&d));
    }

    #[test]
    fn test_sort_objects() {
        let query = Query::<Doc>::builder().descending("score").build().unwrap();
        let sorted = query.sort_objects(vec![doc(1, "", 1), doc(2, "", 3), doc(3, "", 2)]);
        let ids: Vec<u64> = sorted.iter().map(|d| d.id.get()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert!(query.is_sorted(&sorted));
    }

    #[test]
    fn test_display() {
        let query = Query::<Doc>::builder()
            .filter(Predicate::gt("score", 1i64))
            .descending("score")
            .build()
            .unwrap();
        assert_eq!(query.to_string(), "WHERE score > Int64(1) ORDER BY score DESC");
    }
}
