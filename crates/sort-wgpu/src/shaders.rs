/// Invocations per workgroup and keys per histogram tile.
pub const TILE_SIZE: u32 = 256;

/// Depth key generation: one invocation per particle, writes side A.
pub const KEYGEN_SHADER: &str = r#"
struct KeyGenParams {
    view_proj: mat4x4<f32>,
    count: u32,
    pad0: u32,
    pad1: u32,
    pad2: u32,
};

@group(0) @binding(0) var<uniform> params: KeyGenParams;
@group(0) @binding(1) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> keys: array<u32>;
@group(0) @binding(3) var<storage, read_write> values: array<u32>;
@group(0) @binding(4) var<storage, read_write> visible: atomic<u32>;

const CULLED_KEY: u32 = 0xffffffffu;
const DEPTH_ONE_BITS: u32 = 0x3f800000u;

@compute @workgroup_size(256)
fn generate_keys(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.count) {
        return;
    }
    let clip = params.view_proj * vec4<f32>(positions[i].xyz, 1.0);
    var key = CULLED_KEY;
    if (clip.w > 0.0 && clip.z >= 0.0 && clip.z <= clip.w) {
        let depth = clip.z / clip.w;
        var bits = 0u;
        if (depth > 0.0) {
            bits = min(bitcast<u32>(depth), DEPTH_ONE_BITS);
        }
        key = DEPTH_ONE_BITS - bits;
        atomicAdd(&visible, 1u);
    }
    keys[i] = key;
    values[i] = i;
}
"#;

/// Per-tile digit counts, stored digit-major: `histogram[digit * num_tiles + tile]`.
pub const HISTOGRAM_SHADER: &str = r#"
struct PassParams {
    count: u32,
    shift: u32,
    key_mask: u32,
    num_tiles: u32,
};

@group(0) @binding(0) var<uniform> params: PassParams;
@group(0) @binding(1) var<storage, read> keys: array<u32>;
@group(0) @binding(2) var<storage, read_write> histogram: array<u32>;

const TILE: u32 = 256u;
const BUCKETS: u32 = 16u;

var<workgroup> counts: array<atomic<u32>, 16>;

@compute @workgroup_size(256)
fn histogram_tiles(
    @builtin(local_invocation_id) lid: vec3<u32>,
    @builtin(workgroup_id) wid: vec3<u32>,
) {
    if (lid.x < BUCKETS) {
        atomicStore(&counts[lid.x], 0u);
    }
    workgroupBarrier();

    let i = wid.x * TILE + lid.x;
    if (i < params.count) {
        let digit = ((keys[i] & params.key_mask) >> params.shift) & (BUCKETS - 1u);
        atomicAdd(&counts[digit], 1u);
    }
    workgroupBarrier();

    if (lid.x < BUCKETS) {
        histogram[lid.x * params.num_tiles + wid.x] = atomicLoad(&counts[lid.x]);
    }
}
"#;

/// Exclusive prefix sum over the whole histogram in a single workgroup.
///
/// Digit-major storage makes the scanned value the first output slot of
/// each (digit, tile) run.
pub const SCAN_SHADER: &str = r#"
struct PassParams {
    count: u32,
    shift: u32,
    key_mask: u32,
    num_tiles: u32,
};

@group(0) @binding(0) var<uniform> params: PassParams;
@group(0) @binding(1) var<storage, read_write> histogram: array<u32>;

const BUCKETS: u32 = 16u;
const THREADS: u32 = 256u;

var<workgroup> partials: array<u32, 256>;

@compute @workgroup_size(256)
fn scan_histogram(@builtin(local_invocation_id) lid: vec3<u32>) {
    let len = params.num_tiles * BUCKETS;
    let chunk = (len + THREADS - 1u) / THREADS;
    let start = min(lid.x * chunk, len);
    let end = min(start + chunk, len);

    var sum = 0u;
    for (var i = start; i < end; i++) {
        sum += histogram[i];
    }
    partials[lid.x] = sum;
    workgroupBarrier();

    if (lid.x == 0u) {
        var running = 0u;
        for (var t = 0u; t < THREADS; t++) {
            let s = partials[t];
            partials[t] = running;
            running += s;
        }
    }
    workgroupBarrier();

    var offset = partials[lid.x];
    for (var i = start; i < end; i++) {
        let c = histogram[i];
        histogram[i] = offset;
        offset += c;
    }
}
"#;

/// Stable scatter: a key's slot is its (digit, tile) offset plus the number
/// of earlier keys in the tile with the same digit.
pub const SCATTER_SHADER: &str = r#"
struct PassParams {
    count: u32,
    shift: u32,
    key_mask: u32,
    num_tiles: u32,
};

@group(0) @binding(0) var<uniform> params: PassParams;
@group(0) @binding(1) var<storage, read> src_keys: array<u32>;
@group(0) @binding(2) var<storage, read> src_values: array<u32>;
@group(0) @binding(3) var<storage, read_write> dst_keys: array<u32>;
@group(0) @binding(4) var<storage, read_write> dst_values: array<u32>;
@group(0) @binding(5) var<storage, read> offsets: array<u32>;

const TILE: u32 = 256u;
const BUCKETS: u32 = 16u;

var<workgroup> tile_digits: array<u32, 256>;

@compute @workgroup_size(256)
fn scatter_keys(
    @builtin(local_invocation_id) lid: vec3<u32>,
    @builtin(workgroup_id) wid: vec3<u32>,
) {
    let i = wid.x * TILE + lid.x;
    var key = 0u;
    var digit = BUCKETS;
    if (i < params.count) {
        key = src_keys[i];
        digit = ((key & params.key_mask) >> params.shift) & (BUCKETS - 1u);
    }
    tile_digits[lid.x] = digit;
    workgroupBarrier();

    if (i < params.count) {
        var rank = 0u;
        for (var j = 0u; j < lid.x; j++) {
            if (tile_digits[j] == digit) {
                rank += 1u;
            }
        }
        let dst = offsets[digit * params.num_tiles + wid.x] + rank;
        dst_keys[dst] = key;
        dst_values[dst] = src_values[i];
    }
}
"#;
