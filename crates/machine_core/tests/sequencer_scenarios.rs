use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier, Mutex,
    },
    thread,
};

use machine_core::{
    callback_fn, Machine, MachineListener, OperationError, SequencerPhase, Settings,
};

fn enabled_machine() -> Arc<Machine> {
    let machine = Machine::builder()
        .settings(Settings {
            start_enabled: true,
            worker_thread_name: "scenario-seq".into(),
            ..Settings::default()
        })
        .build()
        .expect("machine");
    Arc::new(machine)
}

#[derive(Default)]
struct BusyCounter {
    busy: AtomicUsize,
    idle: AtomicUsize,
}

impl MachineListener for BusyCounter {
    fn busy_changed(&self, busy: bool) {
        if busy {
            self.busy.fetch_add(1, Ordering::SeqCst);
        } else {
            self.idle.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn concurrent_submitters_keep_their_own_order_and_never_overlap() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 40;

    let machine = enabled_machine();
    let counter = Arc::new(BusyCounter::default());
    machine.add_listener(counter.clone());

    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let executed = Arc::new(Mutex::new(Vec::<(usize, usize)>::new()));
    let start = Arc::new(Barrier::new(THREADS));

    let submitters: Vec<_> = (0..THREADS)
        .map(|submitter| {
            let machine = Arc::clone(&machine);
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            let executed = Arc::clone(&executed);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                (0..PER_THREAD)
                    .map(|seq| {
                        let in_flight = Arc::clone(&in_flight);
                        let max_in_flight = Arc::clone(&max_in_flight);
                        let executed = Arc::clone(&executed);
                        machine.submit(move || {
                            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            max_in_flight.fetch_max(now, Ordering::SeqCst);
                            executed.lock().expect("executed").push((submitter, seq));
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                            Ok(seq)
                        })
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for submitter in submitters {
        for (seq, handle) in submitter.join().expect("submitter").into_iter().enumerate() {
            assert_eq!(handle.wait().expect("operation"), seq);
        }
    }

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(machine.sequencer().generations_started(), 1);

    let executed = executed.lock().expect("executed");
    assert_eq!(executed.len(), THREADS * PER_THREAD);
    let mut next_expected: HashMap<usize, usize> = HashMap::new();
    for (submitter, seq) in executed.iter() {
        let expected = next_expected.entry(*submitter).or_insert(0);
        assert_eq!(*seq, *expected, "submitter {submitter} ran out of order");
        *expected += 1;
    }

    assert_eq!(counter.busy.load(Ordering::SeqCst), THREADS * PER_THREAD);
    assert!(counter.idle.load(Ordering::SeqCst) >= 1);
}

#[test]
fn failing_operation_cancels_siblings_and_next_submit_starts_fresh_generation() {
    let machine = enabled_machine();
    let (release, parked) = crossbeam_channel::bounded::<()>(1);
    let (seen_tx, seen_rx) = crossbeam_channel::unbounded::<String>();
    let c_ran = Arc::new(AtomicUsize::new(0));

    let a = machine.submit(move || {
        parked.recv()?;
        Ok("A")
    });
    let err_tx = seen_tx.clone();
    let b = machine.submit_with_callback(
        || -> anyhow::Result<&'static str> { anyhow::bail!("B lost vacuum") },
        callback_fn(
            |_: &&'static str| {},
            move |err: &OperationError| {
                let _ = err_tx.send(err.to_string());
            },
        ),
    );
    let ran = Arc::clone(&c_ran);
    let c = machine.submit(move || {
        ran.fetch_add(1, Ordering::SeqCst);
        Ok("C")
    });
    release.send(()).expect("release A");

    assert_eq!(a.wait().expect("A"), "A");
    assert_eq!(b.wait().expect_err("B").to_string(), "operation failed: B lost vacuum");
    assert_eq!(
        seen_rx.try_recv().expect("B callback"),
        "operation failed: B lost vacuum"
    );
    assert!(c.wait().expect_err("C").is_cancelled());
    assert_eq!(c_ran.load(Ordering::SeqCst), 0);

    assert_eq!(
        machine.sequencer_phase(),
        SequencerPhase::Poisoned { retired: 1 }
    );
    assert_eq!(machine.sequencer().generations_started(), 1);

    let d = machine.submit(|| Ok("D"));
    assert_eq!(d.wait().expect("D"), "D");
    assert_eq!(machine.sequencer().generations_started(), 2);
}

#[test]
fn disabling_the_machine_gates_later_operations() {
    let machine = enabled_machine();
    assert_eq!(machine.submit(|| Ok(1)).wait().expect("enabled"), 1);

    machine.set_enabled(false).expect("disable");
    let err = machine.submit(|| Ok(2)).wait().expect_err("gated");
    assert!(matches!(err, OperationError::MachineNotEnabled));

    let bypass = machine.submit_with(|| Ok(3), None, true);
    assert_eq!(bypass.wait().expect("bypass"), 3);
}
