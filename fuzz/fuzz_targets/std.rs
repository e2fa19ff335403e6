#![no_main]

use libfuzzer_sys::fuzz_target;

use arbitrary::Arbitrary;
use std::collections::HashSet as StdHashSet;
use striped_set::{HashSet as StripedHashSet, Inline};

#[derive(Debug, Arbitrary)]
enum Operation<K> {
    Add(K),
    Remove(K),
    Contains(K),
    Clear,
    Len,
    IsEmpty,
    Retain(K),
    WaitForResize,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    capacity: u8,
    inline: bool,
    operations: Vec<Operation<u32>>,
}

fn fuzz_hashset(input: FuzzInput) {
    let mut std_set = StdHashSet::new();

    let builder = StripedHashSet::builder().capacity(usize::from(input.capacity));
    let builder = if input.inline {
        builder.executor(Inline)
    } else {
        builder
    };

    let striped_raw = match builder.build() {
        Ok(set) => set,
        Err(_) => {
            assert_eq!(input.capacity, 0);
            return;
        }
    };
    let striped_set = striped_raw.pin();

    for op in input.operations {
        match op {
            Operation::Add(k) => {
                let std_result = std_set.insert(k);
                let striped_result = striped_set.add(k);
                assert_eq!(std_result, striped_result);
            }
            Operation::Remove(k) => {
                let std_result = std_set.remove(&k);
                let striped_result = striped_set.remove(&k);
                assert_eq!(std_result, striped_result);
            }
            Operation::Contains(k) => {
                let std_result = std_set.contains(&k);
                let striped_result = striped_set.contains(&k);
                assert_eq!(std_result, striped_result);
            }
            Operation::Clear => {
                std_set.clear();
                striped_set.clear();
            }
            Operation::Len => {
                assert_eq!(std_set.len(), striped_set.len());
            }
            Operation::IsEmpty => {
                assert_eq!(std_set.is_empty(), striped_set.is_empty());
            }
            Operation::Retain(divisor) => {
                let keep = |k: &u32| divisor == 0 || k % divisor != 0;
                std_set.retain(keep);
                striped_set.retain(keep);
            }
            Operation::WaitForResize => {
                striped_raw.wait_for_resize();
                assert!(striped_set.len() < striped_set.capacity() / 2 || std_set.is_empty());
            }
        }
    }

    // Final consistency checks
    for k in std_set.iter() {
        assert!(striped_set.contains(k));
    }
    let mut striped_elements = Vec::new();
    striped_set
        .try_for_each(|k| {
            striped_elements.push(*k);
            Ok::<_, ()>(())
        })
        .unwrap();
    assert_eq!(std_set.len(), striped_elements.len());
    assert_eq!(std_set.len(), striped_set.len());
    assert_eq!(std_set.is_empty(), striped_set.is_empty());
}

fuzz_target!(|data: FuzzInput| {
    fuzz_hashset(data);
});
