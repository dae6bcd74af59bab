//! Instrumented programs executed on the host CPU.
//!
//! Programs here only touch caller-saved registers and end in `retq`, so
//! they can be called as ordinary functions.

#![cfg(all(target_arch = "x86_64", target_os = "linux"))]

use xtr_code::{Code, Gp};
use xtr_trace::{FlagSave, Trace, Tracer, TracerConfig};

fn parse(src: &str) -> Code {
    src.parse().expect("valid listing")
}

fn run(tracer: &Tracer, code: &Code, trace: &mut Trace) {
    let function = tracer.assemble(&trace.addrs(), code).expect("instrumentation");
    let exec = function.load().expect("executable mapping");
    unsafe { exec.call() };
}

#[test]
fn test_two_register_scenario() {
    let code = parse("movq $5, %rax\nmovq $7, %rcx\naddq %rcx, %rax\nretq");
    let tracer = Tracer::new(
        TracerConfig::default()
            .with_regs([Gp::Rax, Gp::Rcx])
            .with_before([0, 2])
            .with_after([2]),
    )
    .unwrap();
    let mut trace = Trace::with_capacity(2);
    run(&tracer, &code, &mut trace);

    assert_eq!(trace.cursor(), 2);
    assert_eq!(trace.states()[0].line, 0);
    assert_eq!(trace.states()[0].after, [0; 16]);
    let second = &trace.states()[1];
    assert_eq!(second.line, 2);
    assert_eq!(second.before[..2], [5, 7]);
    assert_eq!(second.after[..2], [12, 7]);
}

#[test]
fn test_stack_pointer_tracking() {
    let code = parse("nop\npushq %rax\npopq %rax\nretq");
    let tracer = Tracer::new(
        TracerConfig::default()
            .with_regs([Gp::Rsp])
            .with_before([0, 2]),
    )
    .unwrap();
    let mut trace = Trace::with_capacity(2);
    run(&tracer, &code, &mut trace);

    let states = trace.states();
    assert_eq!(states[0].before[0] - states[1].before[0], 8);
    // Inside a call the return address sits at %rsp, so it is 8 mod 16.
    assert_eq!(states[0].before[0] % 16, 8);
}

#[test]
fn test_flags_survive_instrumentation() {
    // jb reads CF from the cmp; jl reads SF and OF from the overflowing add.
    let code = parse(
        "movq $1, %rdx
cmpq $2, %rdx
movq $0, %rcx
jb carry
movq $1, %rcx
carry:
movabsq $0x7fffffffffffffff, %rax
addq $1, %rax
jl less
movq $10, %rdx
retq
less:
movq $20, %rdx
retq",
    );

    for flag_save in [FlagSave::Pushf, FlagSave::Lahf] {
        let tracer = Tracer::new(
            TracerConfig::default()
                .with_regs([Gp::Rcx, Gp::Rdx])
                .with_before(0..code.len())
                .with_flag_save(flag_save),
        )
        .unwrap();
        let mut trace = Trace::with_capacity(code.len());
        run(&tracer, &code, &mut trace);

        // Captured just before the final retq.
        let end = trace.states().last().unwrap();
        let expected = match flag_save {
            FlagSave::Pushf => [0, 10],
            // OF is lost, so SF != OF and jl is taken.
            FlagSave::Lahf => [0, 20],
        };
        assert_eq!(end.before[..2], expected);
    }
}

#[test]
fn test_rebind_to_another_trace() {
    let code = parse("movq $3, %r11\nretq");
    let tracer = Tracer::new(
        TracerConfig::default()
            .with_regs([Gp::R11])
            .with_after([0]),
    )
    .unwrap();
    let mut first = Trace::with_capacity(1);
    let mut second = Trace::with_capacity(1);

    let mut function = tracer.assemble(&first.addrs(), &code).unwrap();
    tracer.rebind(&mut function, &second.addrs(), &code).unwrap();
    let exec = function.load().unwrap();
    unsafe { exec.call() };

    assert!(first.is_empty());
    assert_eq!(second.cursor(), 1);
    assert_eq!(second.states()[0].after[0], 3);
}

#[test]
fn test_loop_past_capacity_stays_in_bounds() {
    let code = parse("movq $4, %rcx\ntop:\ndecq %rcx\njne top\nretq");
    let tracer = Tracer::new(
        TracerConfig::default()
            .with_regs([Gp::Rcx])
            .with_before([2])
            .with_after([2]),
    )
    .unwrap();
    let mut trace = Trace::with_capacity(1);
    run(&tracer, &code, &mut trace);

    assert_eq!(trace.cursor(), 4);
    assert_eq!(trace.len(), 1);
    assert_eq!(trace.states()[0].before[0], 4);
    assert_eq!(trace.states()[0].after[0], 3);
}
