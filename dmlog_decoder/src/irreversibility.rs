//! Heuristic last irreversible block (LIB) estimation.

/// How far behind the head a proof-of-work block is deemed final.
pub const LIB_DISTANCE: u64 = 200;

/// `max(first_streamable_block, block_num - 200)`.
pub fn proof_of_work_lib_num(block_num: u64, first_streamable_block: u64) -> u64 {
    first_streamable_block.max(block_num.saturating_sub(LIB_DISTANCE))
}

/// The finalized block reported by the consensus client, capped to the block
/// itself. A finalized block ahead of the current one happens while
/// reprocessing history against an already synced node.
pub fn proof_of_stake_lib_num(
    block_num: u64,
    finalized_block_num: u64,
    first_streamable_block: u64,
) -> u64 {
    let lib = match finalized_block_num >= block_num {
        true => block_num,
        false => finalized_block_num,
    };
    first_streamable_block.max(lib)
}

#[test]
fn proof_of_work() {
    assert_eq!(proof_of_work_lib_num(0, 200), 200);
    assert_eq!(proof_of_work_lib_num(201, 200), 200);
    assert_eq!(proof_of_work_lib_num(400, 200), 200);
    assert_eq!(proof_of_work_lib_num(401, 200), 201);
    assert_eq!(proof_of_work_lib_num(1_000, 0), 800);
}

#[test]
fn proof_of_stake() {
    assert_eq!(proof_of_stake_lib_num(10, 400, 200), 200);
    assert_eq!(proof_of_stake_lib_num(410, 400, 200), 400);
    assert_eq!(proof_of_stake_lib_num(410, 400, 0), 400);
    assert_eq!(proof_of_stake_lib_num(300, 400, 0), 300);
}
