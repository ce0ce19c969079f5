use super::block::{BlockState, BlockTable, BookkeepingLayout, IndexList, NO_BLOCK, PAGE_SIZE};
use super::stats;
use super::vm::{PlatformVmOps, VmError, VmOps};
use crate::sync::atomic::{AtomicU32, Ordering};
use crate::sync::cell::UnsafeCell;
use crate::sync::unsafe_cell_get_mut;
use std::ptr::NonNull;

/// Byte written into the slack between the start of an allocation's first
/// page and the user pointer.
const FILL_PATTERN: u8 = 0xFC;

const GUARD_TRIP: &str = "unsynchronized multi-threaded heap use detected";

/// Reentrancy tripwire.
///
/// Every public heap operation increments the counter on entry and
/// decrements it on exit. A call that overlaps another (only possible from
/// a second thread) observes a post-increment other than one, or a
/// post-decrement other than zero, and trips. The counter stays perturbed
/// after a trip, so the surviving thread trips too.
struct ThreadGuard(AtomicU32);

impl ThreadGuard {
    #[cfg(not(loom))]
    const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    #[cfg(loom)]
    fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    fn enter(&self) {
        assert!(self.0.fetch_add(1, Ordering::SeqCst) == 0, "{GUARD_TRIP}");
    }

    fn leave(&self) {
        assert!(self.0.fetch_sub(1, Ordering::SeqCst) == 1, "{GUARD_TRIP}");
    }
}

/// A deliberately slow, memory-hungry heap that turns latent memory errors
/// into immediate crashes:
///
/// - Positive array indexing errors fault, because each allocation is pushed
///   as close as its alignment allows to an inaccessible guard page.
/// - Using memory after freeing it faults most of the time: freed blocks
///   stay decommitted on an observation list for as long as possible before
///   any of their pages are recycled.
/// - Double frees are detected most of the time.
/// - Unsynchronized multi-threaded access is detected.
///
/// To improve the odds of catching use-after-free and double frees, make the
/// heap large relative to the working set: freed blocks then sit on the
/// observation list longer before reuse.
///
/// This heap is terribly slow and wastes tons of memory. Swap it in only
/// while hunting memory errors.
pub struct DebugHeap {
    state: UnsafeCell<HeapState>,
    guard: ThreadGuard,
}

// The heap owns its reservation outright and is not internally synchronized.
// Sync is deliberate: unsynchronized cross-thread use must be *expressible*
// for the reentrancy guard to catch it. Callers are responsible for
// serializing access.
// Safety: interior access is serialized by contract; overlapping calls are
// detected by the guard and are fatal.
unsafe impl Send for DebugHeap {}
// Safety: see above.
unsafe impl Sync for DebugHeap {}

struct HeapState {
    /// Base of the whole reservation (bookkeeping + user region).
    range: NonNull<u8>,
    total_bytes: usize,
    bookkeeping_bytes: usize,

    /// Base of the user region.
    base: NonNull<u8>,
    page_count: u32,
    max_allocs: u32,

    free_list: IndexList,
    pending_list: IndexList,
    /// Page index → block index for allocated blocks, `NO_BLOCK` elsewhere.
    lookup: NonNull<u32>,
    table: BlockTable,

    committed_user_bytes: usize,
    live_allocs: u32,
}

impl DebugHeap {
    /// Create a debug heap with a user region of (at least) `budget` bytes.
    ///
    /// The budget is rounded up to a whole number of 4k pages and should be
    /// generously padded: every allocation under 4k costs two pages, and the
    /// more spare room the heap has, the longer freed blocks stay trapped on
    /// the observation list. Budgets beyond 4 GB are fine.
    ///
    /// # Errors
    ///
    /// Returns `VmError` if the address-space reservation fails. Any VM
    /// failure after the reservation succeeds is fatal.
    ///
    /// # Panics
    ///
    /// Panics if the budget covers fewer than two pages, or if the system
    /// page size does not divide 4k.
    pub fn new(budget: usize) -> Result<Self, VmError> {
        let budget = budget.next_multiple_of(PAGE_SIZE);
        assert!(
            budget >= 2 * PAGE_SIZE,
            "heap budget must cover at least two pages"
        );
        assert!(
            PAGE_SIZE.is_multiple_of(PlatformVmOps::page_size()),
            "heap page size must be a whole multiple of the system page size"
        );
        if u32::try_from(budget / PAGE_SIZE).is_err() {
            return Err(VmError::InitializationFailed(
                "heap budget exceeds the addressable page count".to_string(),
            ));
        }

        let layout = BookkeepingLayout::for_budget(budget);

        // Safety: FFI call to reserve memory.
        let range = unsafe { PlatformVmOps::reserve(layout.total_bytes())? };

        // A heap that cannot commit its own bookkeeping cannot diagnose
        // anything; past this point VM failures are fatal.
        // Safety: the bookkeeping region is the head of the reservation.
        unsafe { PlatformVmOps::commit(range, layout.bookkeeping_bytes()) }
            .expect("failed to commit heap bookkeeping region");

        stats::TOTAL_RESERVED.fetch_add(layout.total_bytes(), Ordering::Relaxed);
        stats::TOTAL_COMMITTED.fetch_add(layout.bookkeeping_bytes(), Ordering::Relaxed);
        stats::DEBUG_HEAP_COMMITTED.fetch_add(layout.bookkeeping_bytes(), Ordering::Relaxed);

        let at = |offset: usize| {
            // Safety: every layout offset is inside the committed bookkeeping
            // region; the base is non-null.
            unsafe { NonNull::new_unchecked(range.as_ptr().add(offset)) }
        };

        // Safety: the slot arrays are distinct sub-ranges of the bookkeeping
        // region, sized by the layout, and live as long as the heap.
        let mut free_list =
            unsafe { IndexList::new(at(layout.free_list_off).cast(), layout.page_count) };
        // Safety: as above.
        let pending_list =
            unsafe { IndexList::new(at(layout.pending_list_off).cast(), layout.page_count) };

        let lookup = at(layout.lookup_off).cast::<u32>();
        for page in 0..layout.page_count {
            // Safety: the lookup array has `page_count` slots.
            unsafe { lookup.as_ptr().add(page as usize).write(NO_BLOCK) };
        }

        // Safety: record pool and unused stack are distinct sub-ranges of the
        // bookkeeping region, sized by the layout.
        let mut table = unsafe {
            BlockTable::init(
                at(layout.records_off).cast(),
                at(layout.unused_stack_off).cast(),
                layout.max_allocs,
            )
        };

        // The root block: one free run spanning the entire user region.
        let root = table.alloc();
        {
            let block = table.block_mut(root);
            block.page_index = 0;
            block.page_count = layout.page_count;
        }
        free_list.push(root);

        Ok(Self {
            state: UnsafeCell::new(HeapState {
                range,
                total_bytes: layout.total_bytes(),
                bookkeeping_bytes: layout.bookkeeping_bytes(),
                base: at(layout.bookkeeping_bytes()),
                page_count: layout.page_count,
                max_allocs: layout.max_allocs,
                free_list,
                pending_list,
                lookup,
                table,
                committed_user_bytes: 0,
                live_allocs: 0,
            }),
            guard: ThreadGuard::new(),
        })
    }

    /// Allocate `size` bytes aligned to `align`.
    ///
    /// The returned pointer is pushed as close to the trailing guard page as
    /// the alignment allows, so indexing past the end faults immediately.
    /// Returns `None` if no sufficiently large free block exists even after
    /// consolidating pending frees.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero, or if `align` is not a power of two no
    /// larger than a page.
    pub fn allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        self.guard.enter();
        assert!(size != 0, "zero-size allocation");
        assert!(align.is_power_of_two(), "alignment must be a power of two");
        assert!(
            align <= PAGE_SIZE,
            "alignment larger than a page is not supported"
        );

        // One extra page so there is room for the guard at the end.
        let page_req = 1 + size.div_ceil(PAGE_SIZE);

        // Safety: exclusive access enforced by the caller contract; overlap
        // is caught by the guard.
        let state = unsafe_cell_get_mut!(self.state);

        let mut ptr = state.alloc_from_free_list(page_req);
        if ptr.is_none() {
            // Nothing fits. Consolidate pending frees and try again. This
            // ends the observation window for every parked block, so it is
            // worth a note in diagnostic builds.
            #[cfg(debug_assertions)]
            eprintln!(
                "[guardheap] no free block fits a {page_req}-page request; \
                 flushing {} pending frees",
                state.pending_list.len(),
            );
            state.flush_pending_frees();
            ptr = state.alloc_from_free_list(page_req);
        }
        let result = ptr.map(|p| state.finalize_alloc(p, size, page_req, align));

        #[cfg(debug_assertions)]
        if result.is_none() {
            eprintln!("[guardheap] allocation of {size} bytes failed; heap exhausted");
        }

        self.guard.leave();
        result
    }

    /// Free an allocation.
    ///
    /// The block's pages are decommitted immediately, so any later touch
    /// faults, and the block is parked on the pending list, unavailable for
    /// reuse until the allocator runs out of ready free space.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate`](Self::allocate) on this
    /// heap and not freed since. Both conditions are checked and trip a
    /// fatal assertion when violated (that is the point of this heap); the
    /// call is `unsafe` because references into the allocation must not be
    /// used afterwards, which the compiler cannot see.
    ///
    /// # Panics
    ///
    /// Panics on pointers outside the heap, double frees, and corrupted
    /// bookkeeping.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        self.guard.enter();
        // Safety: as in `allocate`.
        let state = unsafe_cell_get_mut!(self.state);
        state.free(ptr);
        self.guard.leave();
    }

    /// Usable capacity of a live allocation: the bytes from `ptr` up to the
    /// guard page. Alignment may have made this slightly larger than the
    /// requested size.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is outside the heap or not a live allocation.
    pub fn alloc_size(&self, ptr: NonNull<u8>) -> usize {
        self.guard.enter();
        // Safety: as in `allocate`.
        let state = unsafe_cell_get_mut!(self.state);

        let page_index = state.page_index_of(ptr);
        let index = state.lookup_get(page_index);
        assert!(index != NO_BLOCK, "pointer {ptr:p} is not a live allocation");
        let block = state.table.block(index);
        let result =
            (block.page_count - 1) as usize * PAGE_SIZE - ptr.as_ptr() as usize % PAGE_SIZE;

        self.guard.leave();
        result
    }

    /// Quick and dirty range check: could `ptr` have come from this heap?
    /// Does not validate that the pointer is (still) a live allocation; a
    /// pointer into a freed block still answers true.
    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.guard.enter();
        // Safety: as in `allocate`.
        let state = unsafe_cell_get_mut!(self.state);

        let addr = ptr.as_ptr() as usize;
        let base = state.base.as_ptr() as usize;
        let end = base + state.page_count as usize * PAGE_SIZE;
        let result = addr >= base && addr <= end;

        self.guard.leave();
        result
    }

    /// Number of pages in the user region.
    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.guard.enter();
        // Safety: as in `allocate`.
        let result = unsafe_cell_get_mut!(self.state).page_count;
        self.guard.leave();
        result
    }

    /// Upper bound on simultaneously live allocations (every allocation
    /// costs at least two pages).
    #[must_use]
    pub fn max_allocs(&self) -> u32 {
        self.guard.enter();
        // Safety: as in `allocate`.
        let result = unsafe_cell_get_mut!(self.state).max_allocs;
        self.guard.leave();
        result
    }

    /// Live (allocated, not yet freed) allocation count.
    #[must_use]
    pub fn live_allocations(&self) -> u32 {
        self.guard.enter();
        // Safety: as in `allocate`.
        let result = unsafe_cell_get_mut!(self.state).live_allocs;
        self.guard.leave();
        result
    }

    /// Bytes of the user region currently committed (bookkeeping excluded).
    #[must_use]
    pub fn committed_bytes(&self) -> usize {
        self.guard.enter();
        // Safety: as in `allocate`.
        let result = unsafe_cell_get_mut!(self.state).committed_user_bytes;
        self.guard.leave();
        result
    }

    /// Number of blocks on the free list.
    #[must_use]
    pub fn free_block_count(&self) -> u32 {
        self.guard.enter();
        // Safety: as in `allocate`.
        let result = unsafe_cell_get_mut!(self.state).free_list.len();
        self.guard.leave();
        result
    }

    /// Number of freed blocks still trapped on the observation list.
    #[must_use]
    pub fn pending_block_count(&self) -> u32 {
        self.guard.enter();
        // Safety: as in `allocate`.
        let result = unsafe_cell_get_mut!(self.state).pending_list.len();
        self.guard.leave();
        result
    }
}

impl Drop for DebugHeap {
    fn drop(&mut self) {
        // Safety: &mut self guarantees exclusive access.
        let state = unsafe_cell_get_mut!(self.state);

        // Release the whole reservation: bookkeeping pages included, not
        // just the user region.
        // Safety: the range was reserved with exactly this base and size.
        unsafe {
            drop(PlatformVmOps::release(state.range, state.total_bytes));
        }

        stats::sub_saturating(&stats::TOTAL_RESERVED, state.total_bytes);
        let committed = state.bookkeeping_bytes + state.committed_user_bytes;
        stats::sub_saturating(&stats::TOTAL_COMMITTED, committed);
        stats::sub_saturating(&stats::DEBUG_HEAP_COMMITTED, committed);
        if state.live_allocs > 0 {
            stats::sub_saturating(&stats::DEBUG_HEAP_LIVE, state.live_allocs as usize);
        }
    }
}

impl HeapState {
    /// Map a pointer to its page index, tripping on anything outside the
    /// user region.
    fn page_index_of(&self, ptr: NonNull<u8>) -> u32 {
        let offset = (ptr.as_ptr() as usize).wrapping_sub(self.base.as_ptr() as usize);
        let page_index = offset / PAGE_SIZE;
        assert!(
            page_index < self.page_count as usize,
            "pointer {ptr:p} is outside the heap"
        );
        page_index as u32
    }

    fn page_ptr(&self, page: u32) -> NonNull<u8> {
        // Safety: callers pass pages inside the user region; base is
        // non-null.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(page as usize * PAGE_SIZE)) }
    }

    fn lookup_get(&self, page: u32) -> u32 {
        debug_assert!(page < self.page_count);
        // Safety: the lookup array has `page_count` slots.
        unsafe { self.lookup.as_ptr().add(page as usize).read() }
    }

    fn lookup_set(&mut self, page: u32, index: u32) {
        debug_assert!(page < self.page_count);
        // Safety: the lookup array has `page_count` slots.
        unsafe { self.lookup.as_ptr().add(page as usize).write(index) }
    }

    /// Best-fit search and carve. Returns the base of the block's first
    /// page, or `None` if no free block is large enough.
    fn alloc_from_free_list(&mut self, page_req: usize) -> Option<NonNull<u8>> {
        // Smallest sufficient block wins, first hit winning ties. A linear
        // scan is slow; that's OK, it's a debug heap.
        let mut best: Option<(u32, u32)> = None; // (free-list position, page count)
        for pos in 0..self.free_list.len() {
            let index = self.free_list.get(pos);
            let block = self.table.block(index);
            assert!(block.state == BlockState::Free, "free list corrupted");
            if block.page_count as usize >= page_req
                && best.is_none_or(|(_, count)| block.page_count < count)
            {
                best = Some((pos, block.page_count));
            }
        }

        let (best_pos, best_count) = best?;
        let index = self.free_list.swap_remove(best_pos);

        // Carve the request off the front; a fresh record keeps the tail.
        let unused_pages = best_count - page_req as u32;
        if unused_pages > 0 {
            let tail = self.table.alloc();
            let (page_index, next) = {
                let block = self.table.block(index);
                (block.page_index, block.next)
            };
            {
                let tail_block = self.table.block_mut(tail);
                tail_block.page_index = page_index + page_req as u32;
                tail_block.page_count = unused_pages;
                tail_block.prev = index;
                tail_block.next = next;
            }
            if next != NO_BLOCK {
                self.table.block_mut(next).prev = tail;
            }
            {
                let block = self.table.block_mut(index);
                block.next = tail;
                block.page_count = page_req as u32;
            }
            self.free_list.push(tail);
        }

        self.table.block_mut(index).state = BlockState::Allocated;

        let page_index = self.table.block(index).page_index;
        assert!(
            self.lookup_get(page_index) == NO_BLOCK,
            "block lookup corrupted"
        );
        self.lookup_set(page_index, index);
        for i in 1..page_req as u32 {
            assert!(
                self.lookup_get(page_index + i) == NO_BLOCK,
                "block lookup corrupted"
            );
        }

        Some(self.page_ptr(page_index))
    }

    /// Commit the user pages, re-establish the guard page, and place the
    /// user pointer flush against it (modulo alignment).
    fn finalize_alloc(
        &mut self,
        ptr: NonNull<u8>,
        size: usize,
        page_req: usize,
        align: usize,
    ) -> NonNull<u8> {
        let user_bytes = (page_req - 1) * PAGE_SIZE;

        // Safety: the block's pages lie inside the user region.
        unsafe { PlatformVmOps::commit(ptr, user_bytes) }
            .expect("failed to commit allocation pages");

        // The trailing page is already inaccessible (never committed, or
        // decommitted by an earlier free); decommit again so that holds no
        // matter where the block came from.
        // Safety: the guard page is the block's last page.
        let guard_page = unsafe { NonNull::new_unchecked(ptr.as_ptr().add(user_bytes)) };
        // Safety: as above.
        unsafe { PlatformVmOps::decommit(guard_page, PAGE_SIZE) }
            .expect("failed to decommit guard page");

        self.committed_user_bytes += user_bytes;
        self.live_allocs += 1;
        stats::TOTAL_COMMITTED.fetch_add(user_bytes, Ordering::Relaxed);
        stats::DEBUG_HEAP_COMMITTED.fetch_add(user_bytes, Ordering::Relaxed);
        stats::DEBUG_HEAP_LIVE.fetch_add(1, Ordering::Relaxed);

        // Ideally the end of the user data sits exactly at the guard page;
        // align down, sacrificing at most align-1 bytes of tightness.
        let ideal_offset = PAGE_SIZE.wrapping_sub(size) % PAGE_SIZE;
        let offset = ideal_offset & !(align - 1);

        // Garbage-fill the slack in front of the user pointer.
        // Safety: offset < PAGE_SIZE <= user_bytes, all committed above.
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), FILL_PATTERN, offset) };

        // Safety: offset is within the committed range.
        unsafe { NonNull::new_unchecked(ptr.as_ptr().add(offset)) }
    }

    fn free(&mut self, ptr: NonNull<u8>) {
        let page_index = self.page_index_of(ptr);

        let index = self.lookup_get(page_index);
        assert!(index != NO_BLOCK, "double free of {ptr:p}");

        let block = *self.table.block(index);
        assert!(block.state == BlockState::Allocated, "block state corrupted");

        // TODO: check the 0xFC fill between the page start and the user
        // pointer before recycling the block.

        self.table.block_mut(index).state = BlockState::PendingFree;

        // Clear the lookup entry to catch double frees.
        self.lookup_set(page_index, NO_BLOCK);
        for i in 1..block.page_count {
            assert!(
                self.lookup_get(page_index + i) == NO_BLOCK,
                "block lookup corrupted"
            );
        }

        self.pending_list.push(index);

        // Decommit the block so any touch of the freed memory faults. The
        // guard page is already inaccessible.
        let bytes = (block.page_count - 1) as usize * PAGE_SIZE;
        let block_base = self.page_ptr(block.page_index);
        // Safety: the block's pages lie inside the user region.
        unsafe { PlatformVmOps::decommit(block_base, bytes) }
            .expect("failed to decommit freed pages");

        self.committed_user_bytes -= bytes;
        self.live_allocs -= 1;
        stats::sub_saturating(&stats::TOTAL_COMMITTED, bytes);
        stats::sub_saturating(&stats::DEBUG_HEAP_COMMITTED, bytes);
        stats::sub_saturating(&stats::DEBUG_HEAP_LIVE, 1);
    }

    /// Consolidate the pending list into the free list, merging each block
    /// with neighbors that are already free. A pending block never merges
    /// directly with another still-pending block; whichever of the two is
    /// processed first becomes free, and the merge happens when the second
    /// one is reached (or on a later flush).
    fn flush_pending_frees(&mut self) {
        for pos in 0..self.pending_list.len() {
            let mut index = self.pending_list.get(pos);
            let mut merged_left = false;

            // Merge into a free left neighbor, retiring this record.
            let prev = self.table.block(index).prev;
            if prev != NO_BLOCK {
                let prev_block = *self.table.block(prev);
                let block = *self.table.block(index);
                if prev_block.state == BlockState::Free
                    && prev_block.page_index + prev_block.page_count == block.page_index
                {
                    self.table.block_mut(prev).next = block.next;
                    if block.next != NO_BLOCK {
                        self.table.block_mut(block.next).prev = prev;
                    }
                    self.table.block_mut(prev).page_count += block.page_count;
                    self.table.retire(index);

                    // Right-side coalescing continues with the enlarged
                    // neighbor (which already sits on the free list).
                    index = prev;
                    merged_left = true;
                }
            }

            // Merge a free right neighbor into this block.
            let next = self.table.block(index).next;
            if next != NO_BLOCK {
                let next_block = *self.table.block(next);
                let block = *self.table.block(index);
                if next_block.state == BlockState::Free
                    && next_block.page_index == block.page_index + block.page_count
                {
                    self.table.block_mut(index).next = next_block.next;
                    if next_block.next != NO_BLOCK {
                        self.table.block_mut(next_block.next).prev = index;
                    }
                    self.table.block_mut(index).page_count += next_block.page_count;

                    // Find the neighbor on the free list and remove it. This
                    // is slow. That's OK.
                    let free_pos = self
                        .free_list
                        .position_of(next)
                        .expect("free list corrupted");
                    self.free_list.swap_remove(free_pos);
                    self.table.retire(next);
                }
            }

            if !merged_left {
                self.table.block_mut(index).state = BlockState::Free;
                self.free_list.push(index);
            }
        }

        self.pending_list.clear();
    }
}

#[cfg(test)]
impl DebugHeap {
    /// Walk every bookkeeping structure and assert the cross-structure
    /// invariants. With `expect_coalesced`, additionally require that no two
    /// free blocks are adjacent (holds right after a flush).
    pub(crate) fn check_consistency(&self, expect_coalesced: bool) {
        // Safety: tests are single-threaded over the heap.
        let state = unsafe_cell_get_mut!(self.state);
        state.check_consistency(expect_coalesced);
    }
}

#[cfg(test)]
impl HeapState {
    fn check_consistency(&self, expect_coalesced: bool) {
        use std::collections::HashSet;

        // Exactly one live record claims page 0; the address-order walk
        // starts there.
        let mut head = NO_BLOCK;
        for index in self.table.live_indices() {
            if self.table.block(index).page_index == 0 {
                assert!(head == NO_BLOCK, "two blocks claim page 0");
                head = index;
            }
        }
        assert!(head != NO_BLOCK, "no block covers page 0");

        let mut visited = HashSet::new();
        let mut expected_page = 0u32;
        let mut prev = NO_BLOCK;
        let mut prev_state = None;
        let mut index = head;
        while index != NO_BLOCK {
            assert!(visited.insert(index), "block list contains a cycle");
            let block = *self.table.block(index);
            assert_eq!(block.prev, prev, "block list back-link broken");
            assert_eq!(
                block.page_index, expected_page,
                "block list does not tile the heap"
            );
            assert!(block.page_count > 0);
            assert!(
                block.state != BlockState::Unused,
                "unused record linked into the block list"
            );

            // Only the first page of an allocated block resolves in the
            // lookup.
            for i in 0..block.page_count {
                let expect = if block.state == BlockState::Allocated && i == 0 {
                    index
                } else {
                    NO_BLOCK
                };
                assert_eq!(
                    self.lookup_get(block.page_index + i),
                    expect,
                    "block lookup inconsistent"
                );
            }

            if expect_coalesced
                && prev_state == Some(BlockState::Free)
                && block.state == BlockState::Free
            {
                panic!("adjacent free blocks survived a flush");
            }

            prev_state = Some(block.state);
            expected_page += block.page_count;
            prev = index;
            index = block.next;
        }
        assert_eq!(
            expected_page, self.page_count,
            "block list does not cover the heap"
        );
        assert_eq!(
            visited.len(),
            self.table.live_indices().count(),
            "live records exist outside the block list"
        );
        assert!(visited.len() <= self.table.capacity() as usize);

        // The free and pending lists enumerate exactly the blocks in the
        // corresponding states.
        let free: HashSet<u32> = (0..self.free_list.len())
            .map(|p| self.free_list.get(p))
            .collect();
        let pending: HashSet<u32> = (0..self.pending_list.len())
            .map(|p| self.pending_list.get(p))
            .collect();
        assert_eq!(
            free.len() as u32,
            self.free_list.len(),
            "free list has duplicates"
        );
        assert_eq!(
            pending.len() as u32,
            self.pending_list.len(),
            "pending list has duplicates"
        );
        for &index in &visited {
            let state = self.table.block(index).state;
            assert_eq!(
                free.contains(&index),
                state == BlockState::Free,
                "free list out of sync with block states"
            );
            assert_eq!(
                pending.contains(&index),
                state == BlockState::PendingFree,
                "pending list out of sync with block states"
            );
        }
        for index in free.union(&pending) {
            assert!(visited.contains(index), "list references an unlinked block");
        }
    }
}
