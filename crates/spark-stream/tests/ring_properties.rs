//! 环形缓冲性质验证
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：以影子队列（`VecDeque`）为模型，验证任意写/读操作序列下：
//!   1. 占用量始终满足 `0 <= write_pos - read_pos <= capacity`；
//!   2. 成功读出的单元序列等于成功写入的单元序列（FIFO，无丢失无重复）；
//!   3. 失败的写入或读取不改变任何游标。
//! - **设计手法 (How)**：Proptest 生成 `Op` 序列，逐步同时驱动真实缓冲与模型并比较结果。
//! - **跨线程补充 (What)**：`cross_thread_fifo_preserves_order` 在真实线程上以随机批次写入、固定窗口读取，
//!   检查拼接后的输出与输入一致。

#![cfg(not(all(feature = "loom-model", any(loom, spark_loom))))]

use std::{collections::VecDeque, thread};

use proptest::prelude::*;
use spark_stream::{CapacityExceeded, CircularBuffer, InsufficientData};

#[derive(Clone, Debug)]
enum Op {
    Write(Vec<u16>),
    Read(usize),
}

fn op_strategy(capacity: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        prop::collection::vec(any::<u16>(), 0..=capacity + 4).prop_map(Op::Write),
        (0..=capacity + 4).prop_map(Op::Read),
    ]
}

fn scenario() -> impl Strategy<Value = (usize, Vec<Op>)> {
    (1usize..=24).prop_flat_map(|capacity| {
        (
            Just(capacity),
            prop::collection::vec(op_strategy(capacity), 1..80),
        )
    })
}

proptest! {
    #[test]
    fn prop_buffer_matches_fifo_model((capacity, ops) in scenario()) {
        let (mut writer, mut reader) = CircularBuffer::<u16>::new(capacity).unwrap().split();
        let mut model: VecDeque<u16> = VecDeque::new();
        let storage = writer.storage_addr();

        for op in ops {
            let before = (writer.write_pos(), reader.read_pos());
            match op {
                Op::Write(data) => {
                    let free = capacity - model.len();
                    match writer.write(&data) {
                        Ok(()) => {
                            prop_assert!(data.len() <= free);
                            model.extend(data.iter().copied());
                            prop_assert_eq!(writer.write_pos(), before.0 + data.len() as u64);
                        }
                        Err(err) => {
                            prop_assert_eq!(err, CapacityExceeded {
                                requested: data.len(),
                                free,
                                capacity,
                            });
                            prop_assert_eq!((writer.write_pos(), reader.read_pos()), before);
                        }
                    }
                }
                Op::Read(size) => match reader.read_window(size) {
                    Ok(window) => {
                        let expected: Vec<u16> = model.drain(..size).collect();
                        prop_assert_eq!(window, expected);
                    }
                    Err(err) => {
                        prop_assert_eq!(err, InsufficientData {
                            requested: size,
                            available: model.len(),
                        });
                        prop_assert_eq!((writer.write_pos(), reader.read_pos()), before);
                    }
                },
            }

            let occupied = writer.write_pos() - reader.read_pos();
            prop_assert!(occupied <= capacity as u64);
            prop_assert_eq!(occupied as usize, model.len());
            prop_assert_eq!(reader.available(), model.len());
            prop_assert_eq!(writer.free(), capacity - model.len());
        }

        prop_assert_eq!(writer.storage_addr(), storage);
    }
}

#[test]
fn cross_thread_fifo_preserves_order() {
    const WINDOW: usize = 7;
    const TOTAL_WINDOWS: usize = 2_000;

    let input: Vec<u32> = (0..(WINDOW * TOTAL_WINDOWS) as u32).collect();
    let (mut writer, mut reader) = CircularBuffer::<u32>::new(64).unwrap().split();

    let producer_input = input.clone();
    let producer = thread::spawn(move || {
        let mut rng = fastrand::Rng::with_seed(7);
        let mut offset = 0;
        while offset < producer_input.len() {
            let len = rng.usize(1..=32).min(producer_input.len() - offset);
            let batch = &producer_input[offset..offset + len];
            while writer.write(batch).is_err() {
                thread::yield_now();
            }
            offset += len;
        }
    });

    let mut output = Vec::with_capacity(input.len());
    let mut window = [0u32; WINDOW];
    while output.len() < input.len() {
        match reader.read_window_into(&mut window) {
            Ok(()) => output.extend_from_slice(&window),
            Err(_) => thread::yield_now(),
        }
    }

    producer.join().unwrap();
    assert_eq!(output, input);
}
