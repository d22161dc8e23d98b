//! Built-in GLSL ES 3.00 sources.

use crate::shader::ShaderSource;

/// Two-triangle strip covering clip space.
pub const QUAD_VERTICES: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

pub const QUAD_VERTEX: &str = r#"#version 300 es
in vec2 a_position;
out vec2 v_uv;

void main() {
    v_uv = a_position * 0.5 + 0.5;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
"#;

pub const FLUID_FRAGMENT: &str = r#"#version 300 es
precision highp float;

in vec2 v_uv;
out vec4 fragColor;

uniform float u_time;
uniform vec2 u_resolution;
uniform vec2 u_mouse;
uniform float u_mouseActive;
uniform float u_viscosity;
uniform float u_distortion;
uniform float u_speed;
uniform float u_colorShift;

float hash(vec2 p) {
    return fract(sin(dot(p, vec2(127.1, 311.7))) * 43758.5453);
}

float noise(vec2 p) {
    vec2 i = floor(p);
    vec2 f = fract(p);
    vec2 u = f * f * (3.0 - 2.0 * f);
    return mix(mix(hash(i), hash(i + vec2(1.0, 0.0)), u.x),
               mix(hash(i + vec2(0.0, 1.0)), hash(i + vec2(1.0, 1.0)), u.x), u.y);
}

float fbm(vec2 p) {
    float v = 0.0;
    float a = 0.5;
    for (int i = 0; i < 5; i++) {
        v += a * noise(p);
        p *= 2.0;
        a *= 0.5;
    }
    return v;
}

void main() {
    vec2 uv = v_uv;
    float aspect = u_resolution.x / max(u_resolution.y, 1.0);
    vec2 p = vec2(uv.x * aspect, uv.y);

    vec2 mouse = u_mouse / max(u_resolution, vec2(1.0));
    mouse.y = 1.0 - mouse.y;
    float dist = distance(uv, mouse);
    float ripple = u_mouseActive * exp(-dist * 8.0) * sin(dist * 40.0 - u_time * 4.0);

    float flow = 1.0 - u_viscosity * 0.8;
    vec2 q = vec2(fbm(p * 3.0 + u_time * 0.1 * flow), fbm(p * 3.0 - u_time * 0.13 * flow));
    vec2 r = vec2(fbm(p * 3.0 + q * 4.0 * u_distortion + vec2(1.7, 9.2) + ripple),
                  fbm(p * 3.0 + q * 4.0 * u_distortion + vec2(8.3, 2.8)));
    float f = fbm(p * 3.0 + r * 2.0);

    vec3 base = vec3(0.1, 0.3, 0.6) + 0.5 * cos(6.2831 * (f + u_colorShift + vec3(0.0, 0.33, 0.67)));
    fragColor = vec4(base * (0.6 + 0.6 * f), 1.0);
}
"#;

pub const PARTICLE_VERTEX: &str = r#"#version 300 es
in vec3 a_position;
in vec3 a_color;
out vec3 v_color;

uniform vec2 u_resolution;
uniform float u_particleSize;
uniform float u_bounds;
uniform float u_time;

void main() {
    float yaw = u_time * 0.1;
    mat3 rot = mat3(cos(yaw), 0.0, -sin(yaw), 0.0, 1.0, 0.0, sin(yaw), 0.0, cos(yaw));
    vec3 p = rot * a_position / max(u_bounds, 0.0001);
    float depth = 2.5 - p.z;
    float aspect = u_resolution.x / max(u_resolution.y, 1.0);
    gl_Position = vec4(p.x / aspect, p.y, 0.0, depth);
    gl_PointSize = u_particleSize * 2.5 / depth;
    v_color = a_color;
}
"#;

pub const PARTICLE_FRAGMENT: &str = r#"#version 300 es
precision mediump float;

in vec3 v_color;
out vec4 fragColor;

void main() {
    vec2 c = gl_PointCoord - 0.5;
    float d = length(c);
    if (d > 0.5) discard;
    fragColor = vec4(v_color, smoothstep(0.5, 0.1, d));
}
"#;

pub fn fluid() -> ShaderSource {
    ShaderSource::new(QUAD_VERTEX, FLUID_FRAGMENT)
}

pub fn particles() -> ShaderSource {
    ShaderSource::new(PARTICLE_VERTEX, PARTICLE_FRAGMENT)
}
