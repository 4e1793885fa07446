use indexmap::IndexMap;

use crate::types::{ObjectType, Type};

/// Least upper bound of `types`.
///
/// Empty input and any disagreement that no single kind can absorb yield
/// `dynamic`. Collections of one kind unify their element types; objects keep
/// the attributes every input has; equal-length tuples unify per position.
pub fn unify(types: &[Type]) -> Type {
    let mut distinct: Vec<&Type> = Vec::with_capacity(types.len());
    for t in types {
        if !distinct.contains(&t) {
            distinct.push(t);
        }
    }
    match distinct.as_slice() {
        [] => return Type::Dynamic,
        [only] => return (*only).clone(),
        _ => {}
    }
    if distinct.iter().any(|t| t.is_dynamic()) {
        return Type::Dynamic;
    }

    match distinct[0] {
        Type::List(_) => unify_elements(&distinct, Type::list, |t| match t {
            Type::List(e) => Some(e),
            _ => None,
        }),
        Type::Set(_) => unify_elements(&distinct, Type::set, |t| match t {
            Type::Set(e) => Some(e),
            _ => None,
        }),
        Type::Map(_) => unify_elements(&distinct, Type::map, |t| match t {
            Type::Map(e) => Some(e),
            _ => None,
        }),
        Type::Object(_) => {
            let objects: Option<Vec<&ObjectType>> = distinct.iter().map(|t| t.object_type()).collect();
            objects.map_or(Type::Dynamic, |objs| unify_objects(&objs))
        }
        Type::Tuple(first) => {
            let tuples: Option<Vec<&[Type]>> = distinct
                .iter()
                .map(|t| t.tuple_elements().filter(|elems| elems.len() == first.len()))
                .collect();
            match tuples {
                Some(tuples) => Type::tuple((0..first.len()).map(|i| {
                    let column: Vec<Type> = tuples.iter().map(|elems| elems[i].clone()).collect();
                    unify(&column)
                })),
                None => Type::Dynamic,
            }
        }
        // distinct primitives or capsules never share a bound
        _ => Type::Dynamic,
    }
}

fn unify_elements<W, E>(types: &[&Type], wrap: W, elem: E) -> Type
where
    W: Fn(Type) -> Type,
    E: Fn(&Type) -> Option<&std::sync::Arc<Type>>,
{
    let elems: Option<Vec<Type>> = types.iter().map(|t| elem(*t).map(|e| (**e).clone())).collect();
    match elems {
        Some(elems) => wrap(unify(&elems)),
        None => Type::Dynamic,
    }
}

/// Attributes present in every object survive, in the first object's order.
/// An attribute optional anywhere stays optional.
fn unify_objects(objects: &[&ObjectType]) -> Type {
    let first = objects[0];
    let mut attrs: IndexMap<String, Type> = IndexMap::new();
    let mut optional: Vec<String> = Vec::new();

    for name in first.attributes().keys() {
        let column: Option<Vec<Type>> = objects.iter().map(|o| o.attribute_type(name).cloned()).collect();
        let Some(column) = column else { continue };
        attrs.insert(name.clone(), unify(&column));
        if objects.iter().any(|o| o.is_optional(name)) {
            optional.push(name.clone());
        }
    }

    if attrs.is_empty() && objects.iter().all(|o| !o.is_empty()) {
        return Type::Dynamic;
    }
    // every optional name was just inserted into attrs
    Type::object_with_optional(attrs, optional).unwrap_or(Type::Dynamic)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(attrs: &[(&str, Type)]) -> Type {
        Type::object(attrs.iter().cloned())
    }

    fn obj_opt(attrs: &[(&str, Type)], optional: &[&str]) -> Type {
        Type::object_with_optional(attrs.iter().cloned(), optional.iter().copied()).unwrap()
    }

    #[test]
    fn trivial_cases() {
        assert_eq!(unify(&[]), Type::Dynamic);
        assert_eq!(unify(&[Type::String]), Type::String);
        assert_eq!(unify(&[Type::String, Type::String]), Type::String);
        assert_eq!(unify(&[Type::String, Type::Number]), Type::Dynamic);
        assert_eq!(unify(&[Type::String, Type::Dynamic]), Type::Dynamic);
    }

    #[test]
    fn collections() {
        let ls = Type::list(Type::String);
        let ln = Type::list(Type::Number);
        assert_eq!(unify(&[ls.clone(), ls.clone()]), ls);
        assert_eq!(unify(&[ls.clone(), ln]), Type::list(Type::Dynamic));
        assert_eq!(unify(&[ls, Type::set(Type::String)]), Type::Dynamic);
    }

    #[test]
    fn objects_intersect() {
        assert_eq!(
            unify(&[obj(&[("a", Type::String)]), obj(&[("b", Type::String)])]),
            Type::Dynamic
        );
        assert_eq!(
            unify(&[
                obj(&[("a", Type::String), ("b", Type::Number)]),
                obj(&[("a", Type::String), ("c", Type::Bool)]),
            ]),
            obj(&[("a", Type::String)])
        );
        assert_eq!(
            unify(&[obj(&[("common", Type::String)]), obj(&[("common", Type::Number)])]),
            obj(&[("common", Type::Dynamic)])
        );
        assert_eq!(unify(&[Type::empty_object(), obj(&[("a", Type::String)])]), Type::empty_object());
    }

    #[test]
    fn optional_is_sticky() {
        assert_eq!(
            unify(&[
                obj(&[("a", Type::String)]),
                obj_opt(&[("a", Type::String), ("b", Type::Number)], &["b"]),
            ]),
            obj(&[("a", Type::String)])
        );
        assert_eq!(
            unify(&[obj(&[("a", Type::String)]), obj_opt(&[("a", Type::String)], &["a"])]),
            obj_opt(&[("a", Type::String)], &["a"])
        );
    }

    #[test]
    fn tuples() {
        let t1 = Type::tuple([Type::String]);
        let t2 = Type::tuple([Type::String, Type::Number]);
        assert_eq!(unify(&[t1, t2]), Type::Dynamic);
        let a = Type::tuple([Type::String, Type::Number]);
        let b = Type::tuple([Type::String, Type::Bool]);
        assert_eq!(unify(&[a, b]), Type::tuple([Type::String, Type::Dynamic]));
    }

    #[test]
    fn order_does_not_matter() {
        let xs = [obj(&[("a", Type::Number), ("b", Type::String)]), obj(&[("b", Type::String), ("a", Type::Bool)])];
        let ys = [xs[1].clone(), xs[0].clone()];
        assert_eq!(unify(&xs), unify(&ys));
    }
}
