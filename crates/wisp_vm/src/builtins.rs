use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::{Value, NULL};

pub struct Builtin {
    pub name: &'static str,
    pub func: fn(&[Value]) -> Value,
}

fn error(msg: String) -> Value {
    Value::Error(Rc::from(msg.as_str()))
}

fn len(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!("wrong number of arguments in builtin function(len). got={}, want=1", args.len()));
    }
    match &args[0] {
        Value::String(s) => Value::Integer(s.len() as i64),
        Value::Array(a) => Value::Integer(a.borrow().len() as i64),
        other => error(format!("argument to `len` not supported, got {}", other.type_tag())),
    }
}

fn first(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!("wrong number of arguments in builtin function(first/last). got={}, want=1", args.len()));
    }
    match &args[0] {
        Value::Array(a) => a.borrow().first().cloned().unwrap_or(NULL),
        other => error(format!("argument to `first/last` must be ARRAY, got {}", other.type_tag())),
    }
}

fn last(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!("wrong number of arguments in builtin function(first/last). got={}, want=1", args.len()));
    }
    match &args[0] {
        Value::Array(a) => a.borrow().last().cloned().unwrap_or(NULL),
        other => error(format!("argument to `first/last` must be ARRAY, got {}", other.type_tag())),
    }
}

fn rest(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!("wrong number of arguments in builtin function(first/last). got={}, want=1", args.len()));
    }
    match &args[0] {
        Value::Array(a) => {
            let elems = a.borrow();
            if elems.is_empty() {
                NULL
            } else {
                Value::Array(Rc::new(RefCell::new(elems[1..].to_vec())))
            }
        }
        other => error(format!("argument to `first/last` must be ARRAY, got {}", other.type_tag())),
    }
}

fn push(args: &[Value]) -> Value {
    if args.len() != 2 {
        return error(format!("wrong number of arguments in builtin function(push). got={}, want=2", args.len()));
    }
    match &args[0] {
        Value::Array(a) => {
            let mut elems = a.borrow().clone();
            elems.push(args[1].clone());
            Value::Array(Rc::new(RefCell::new(elems)))
        }
        other => error(format!("argument to `push` must be ARRAY, got {}", other.type_tag())),
    }
}

fn print_builtin(args: &[Value]) -> Value {
    let rendered: Vec<String> = args.iter().map(|v| v.inspect()).collect();
    println!("{}", rendered.join(" "));
    NULL
}

fn to_string(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!("wrong number of arguments in builtin function(to_string). got={}, want=1", args.len()));
    }
    match &args[0] {
        Value::Integer(n) => Value::String(Rc::from(n.to_string().as_str())),
        other => error(format!("argument to `str` must be INTEGER, got {}", other.type_tag())),
    }
}

fn concat(args: &[Value]) -> Value {
    if args.len() != 2 {
        return error(format!("wrong number of arguments in builtin function(concat). got={}, want=2", args.len()));
    }
    match (&args[0], &args[1]) {
        (Value::String(a), Value::String(b)) => Value::String(Rc::from(format!("{}{}", a, b).as_str())),
        (Value::Array(a), Value::Array(b)) => {
            let mut elems = a.borrow().clone();
            elems.extend(b.borrow().iter().cloned());
            Value::Array(Rc::new(RefCell::new(elems)))
        }
        (a, b) if a.type_tag() != b.type_tag() => {
            error(format!("arguments to `concat` must be the same type, got {} and {}", a.type_tag(), b.type_tag()))
        }
        (a, _) => error(format!("arguments to `concat` must be STRING or ARRAY, got {}", a.type_tag())),
    }
}

fn zip(args: &[Value]) -> Value {
    if args.len() != 2 {
        return error(format!("wrong number of arguments in builtin function(zip). got={}, want=2", args.len()));
    }
    let (keys, values) = match (&args[0], &args[1]) {
        (Value::Array(a), Value::Array(b)) => (a.borrow().clone(), b.borrow().clone()),
        (a, b) => {
            return error(format!("arguments to `zip` must be ARRAY, got {} and {}", a.type_tag(), b.type_tag()));
        }
    };
    let mut pairs = IndexMap::new();
    for (k, v) in keys.into_iter().zip(values.into_iter()) {
        match k.hash_key() {
            Ok(hk) => {
                pairs.insert(hk, (k, v));
            }
            Err(_) => {
                return error(format!("in builtin function `zip`, unusable as hash key: {}({})", k.inspect(), k.type_tag()));
            }
        }
    }
    Value::Hash(Rc::new(RefCell::new(pairs)))
}

fn set(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!("wrong number of arguments in builtin function(set). got={}, want=1", args.len()));
    }
    let elems = match &args[0] {
        Value::Array(a) => a.borrow().clone(),
        other => return error(format!("argument to `set` must be ARRAY, got {}", other.type_tag())),
    };
    let mut seen = IndexMap::new();
    for v in elems {
        match v.hash_key() {
            Ok(hk) => {
                seen.entry(hk).or_insert(v);
            }
            Err(_) => {
                return error(format!("in builtin function `set`, unusable as hash key: {}({})", v.inspect(), v.type_tag()));
            }
        }
    }
    Value::Array(Rc::new(RefCell::new(seen.into_values().collect())))
}

fn type_of(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!("wrong number of arguments in builtin function `type`. got={}, want=1", args.len()));
    }
    Value::String(Rc::from(args[0].type_tag()))
}

fn cut(args: &[Value]) -> Value {
    if args.len() != 2 && args.len() != 3 {
        return error(format!("wrong number of arguments in builtin function `cut`. got={}, want=2 or 3", args.len()));
    }
    let start = match &args[1] {
        Value::Integer(n) => *n,
        other => return error(format!("second argument to `cut` must be INTEGER, got {}", other.type_tag())),
    };
    match &args[0] {
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let end = match args.get(2) {
                Some(Value::Integer(n)) => *n,
                Some(other) => return error(format!("second argument to `cut` must be INTEGER, got {}", other.type_tag())),
                None => chars.len() as i64,
            };
            if start < 0 || start as usize >= chars.len() {
                return error(format!("start index out of range: {}", start));
            }
            if end < start || end as usize > chars.len() {
                return error(format!("end index out of range: {}", end));
            }
            let slice: String = chars[start as usize..end as usize].iter().collect();
            Value::String(Rc::from(slice.as_str()))
        }
        Value::Array(a) => {
            let elems = a.borrow();
            let end = match args.get(2) {
                Some(Value::Integer(n)) => *n,
                Some(other) => return error(format!("second argument to `cut` must be INTEGER, got {}", other.type_tag())),
                None => elems.len() as i64,
            };
            if start < 0 || start as usize >= elems.len() {
                return error(format!("start index out of range: {}", start));
            }
            if end < start || end as usize > elems.len() {
                return error(format!("end index out of range: {}", end));
            }
            Value::Array(Rc::new(RefCell::new(elems[start as usize..end as usize].to_vec())))
        }
        other => error(format!("first argument to `cut` must be STRING or ARRAY, got {}", other.type_tag())),
    }
}

fn re(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!("wrong number of arguments in builtin function `re`. got={}, want=1", args.len()));
    }
    match &args[0] {
        Value::String(s) => {
            let reversed: String = s.chars().rev().collect();
            Value::String(Rc::from(reversed.as_str()))
        }
        Value::Array(a) => {
            let mut elems = a.borrow().clone();
            elems.reverse();
            Value::Array(Rc::new(RefCell::new(elems)))
        }
        other => error(format!("argument to `re` must be STRING or ARRAY, got {}", other.type_tag())),
    }
}

/// Fixed registration order: compile-time symbol indices and run-time
/// dispatch indices must agree, since `OpGetBuiltin idx` is the only link
/// between the two.
pub fn catalog() -> Vec<Builtin> {
    vec![
        Builtin { name: "len", func: len },
        Builtin { name: "first", func: first },
        Builtin { name: "last", func: last },
        Builtin { name: "rest", func: rest },
        Builtin { name: "push", func: push },
        Builtin { name: "print", func: print_builtin },
        Builtin { name: "str", func: to_string },
        Builtin { name: "concat", func: concat },
        Builtin { name: "zip", func: zip },
        Builtin { name: "set", func: set },
        Builtin { name: "type", func: type_of },
        Builtin { name: "cut", func: cut },
        Builtin { name: "re", func: re },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr(vals: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(vals)))
    }

    #[test]
    fn t_len_string_and_array() {
        assert_eq!(len(&[Value::String(Rc::from("hello"))]), Value::Integer(5));
        assert_eq!(len(&[arr(vec![Value::Integer(1), Value::Integer(2)])]), Value::Integer(2));
    }

    #[test]
    fn t_len_wrong_arity() {
        match len(&[]) {
            Value::Error(msg) => assert_eq!(&*msg, "wrong number of arguments in builtin function(len). got=0, want=1"),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn t_first_last_rest_on_empty() {
        assert_eq!(first(&[arr(vec![])]), NULL);
        assert_eq!(last(&[arr(vec![])]), NULL);
        assert_eq!(rest(&[arr(vec![])]), NULL);
    }

    #[test]
    fn t_push_is_non_destructive() {
        let original = arr(vec![Value::Integer(1)]);
        let result = push(&[original.clone(), Value::Integer(2)]);
        if let Value::Array(a) = &original {
            assert_eq!(a.borrow().len(), 1);
        }
        if let Value::Array(a) = result {
            assert_eq!(*a.borrow(), vec![Value::Integer(1), Value::Integer(2)]);
        }
    }

    #[test]
    fn t_concat_type_mismatch() {
        match concat(&[Value::Integer(1), Value::String(Rc::from("x"))]) {
            Value::Error(msg) => assert_eq!(&*msg, "arguments to `concat` must be the same type, got INTEGER and STRING"),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn t_cut_string_bounds() {
        match cut(&[Value::String(Rc::from("hello")), Value::Integer(10)]) {
            Value::Error(msg) => assert_eq!(&*msg, "start index out of range: 10"),
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(cut(&[Value::String(Rc::from("hello")), Value::Integer(1), Value::Integer(3)]), Value::String(Rc::from("el")));
    }

    #[test]
    fn t_re_string_and_array() {
        assert_eq!(re(&[Value::String(Rc::from("abc"))]), Value::String(Rc::from("cba")));
        match re(&[arr(vec![Value::Integer(1), Value::Integer(2)])]) {
            Value::Array(a) => assert_eq!(*a.borrow(), vec![Value::Integer(2), Value::Integer(1)]),
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn t_zip_unhashable_key() {
        match zip(&[arr(vec![arr(vec![])]), arr(vec![Value::Integer(1)])]) {
            Value::Error(msg) => assert_eq!(&*msg, "in builtin function `zip`, unusable as hash key: [](ARRAY)"),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn t_set_unhashable_key() {
        match set(&[arr(vec![arr(vec![])])]) {
            Value::Error(msg) => assert_eq!(&*msg, "in builtin function `set`, unusable as hash key: [](ARRAY)"),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn t_cut_string_start_equal_to_len_is_out_of_range() {
        match cut(&[Value::String(Rc::from("abc")), Value::Integer(3)]) {
            Value::Error(msg) => assert_eq!(&*msg, "start index out of range: 3"),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn t_catalog_order_is_stable() {
        let names: Vec<&str> = catalog().iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["len", "first", "last", "rest", "push", "print", "str", "concat", "zip", "set", "type", "cut", "re"]);
    }
}
