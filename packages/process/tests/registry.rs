use std::sync::Arc;
use std::thread;

use yao_process::{
    alias, args, exists, handler, register, register_dynamic, unregister, Exception, Process,
    Registry, Value,
};

#[test]
fn registered_names_resolve_and_unknown_names_do_not() {
    register("itest.static.hello", |p| {
        Ok(Value::from(format!("hello {}", p.args_string(0))))
    });

    let value = Process::of("itest.static.Hello", args!["yao"]).unwrap().run();
    assert_eq!(value, Value::from("hello yao"));

    let err = Process::of("unknown.handler", vec![]).unwrap_err();
    assert!(err.to_string().starts_with("Exception|404"));
}

#[test]
fn alias_dispatches_to_the_same_handler() {
    register("itest.alias.source", |_| Ok(Value::from("source")));
    alias("itest.alias.source", "itest.alias.target").unwrap();

    let a = Process::of("itest.alias.source", vec![]).unwrap().run();
    let b = Process::of("itest.alias.target", vec![]).unwrap().run();
    assert_eq!(a, b);
}

#[test]
fn new_panics_on_missing_handler() {
    let result = std::panic::catch_unwind(|| Process::new("itest.none.here", vec![]));
    let e = yao_process::exception_from_panic(result.unwrap_err());
    assert_eq!(e.code, 404);
}

#[test]
fn concurrent_dynamic_registration() {
    const N: usize = 32;

    let workers: Vec<_> = (0..N)
        .map(|i| {
            thread::spawn(move || {
                let name = format!("itest.concurrent.h{}", i);
                register_dynamic(&name, handler(move |_| Ok(Value::from(i))));
                if i % 2 == 0 {
                    assert!(unregister(&name));
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    for i in 0..N {
        let name = format!("itest.concurrent.h{}", i);
        assert_eq!(exists(&name), i % 2 == 1, "{}", name);
        if i % 2 == 1 {
            let value = Process::of(&name, vec![]).unwrap().run();
            assert_eq!(value, Value::from(i));
        }
    }
}

#[test]
fn dispatch_while_registering() {
    let registry = Arc::new(Registry::new());
    registry.register("itest.live.read", |_| Ok(Value::from(true)));

    let writer = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for i in 0..200 {
                let name = format!("itest.live.w{}", i);
                registry.register_dynamic(&name, handler(|_| Ok(Value::Null)));
                registry.unregister(&name);
            }
        })
    };

    for _ in 0..200 {
        let value = registry
            .process("itest.live.read", vec![])
            .unwrap()
            .exec()
            .unwrap();
        assert_eq!(value, Value::from(true));
    }
    writer.join().unwrap();
    assert_eq!(registry.len(), 1);
}

#[test]
fn exec_turns_argument_errors_into_bad_request() {
    register("itest.args.strict", |p| {
        p.validate_arg_nums(2)?;
        Ok(Value::from(p.args_int(0) + p.args_int(1)))
    });

    let err = Process::of("itest.args.strict", args![1])
        .unwrap()
        .exec()
        .unwrap_err();
    assert_eq!(err.code, 400);

    let ok = Process::of("itest.args.strict", args![1, "2"])
        .unwrap()
        .exec()
        .unwrap();
    assert_eq!(ok, Value::from(3));

    let parsed: Exception = err.to_string().parse().unwrap();
    assert_eq!(parsed, err);
}
